#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use bftgraph::db::{
    AbortReason, CommitCoordinator, CommitOutcome, Config, ConsistencyConfig, WriteLog,
};
use bftgraph::model::Node;
use bftgraph::storage::{
    codec, CounterMetrics, DatabaseAccess, MemoryGraph, Operation, UnknownEntityPolicy,
};
use bftgraph::types::{ClientId, GraphError, Result, SnapshotId};

fn coordinator(config: &ConsistencyConfig) -> CommitCoordinator<MemoryGraph> {
    CommitCoordinator::new(Arc::new(MemoryGraph::new()), config)
}

#[test]
fn concurrent_writers_get_unique_increasing_ids() -> Result<()> {
    let config = ConsistencyConfig {
        recent_capacity: 4,
        ..ConsistencyConfig::default()
    };
    let coord = Arc::new(coordinator(&config));

    let handles: Vec<_> = (0..8u32)
        .map(|client| {
            let coord = Arc::clone(&coord);
            thread::spawn(move || -> Result<Vec<SnapshotId>> {
                let mut ids = Vec::new();
                for i in 0..25 {
                    let mut tx = coord.begin(ClientId(client));
                    tx.create(Node::with_id(format!("c{client}-{i}")));
                    match coord.commit(tx)? {
                        CommitOutcome::Committed { sequence, .. } => ids.push(sequence),
                        other => panic!("create-only transaction did not commit: {other:?}"),
                    }
                }
                Ok(ids)
            })
        })
        .collect();

    let mut all = BTreeSet::new();
    for handle in handles {
        let ids = handle.join().expect("writer thread panicked")?;
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        for id in ids {
            assert!(all.insert(id), "sequence {id} handed out twice");
        }
    }
    assert_eq!(all.len(), 200);
    assert_eq!(all.first(), Some(&SnapshotId(1)));
    assert_eq!(all.last(), Some(&SnapshotId(200)));
    assert_eq!(coord.last_sequence(), SnapshotId(200));
    assert_eq!(coord.log().recent_len(), 4);
    assert_eq!(coord.log().global_len(), 196);
    assert_eq!(coord.access().node_count(), 200);
    Ok(())
}

#[test]
fn first_committer_wins_on_same_node() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let coord = coordinator(&ConsistencyConfig::default()).with_metrics(metrics.clone());

    let mut setup = coord.begin(ClientId(0));
    setup.create(Node::with_id("A"));
    coord.commit(setup)?;

    let mut first = coord.begin(ClientId(1));
    let mut second = coord.begin(ClientId(2));
    for tx in [&mut first, &mut second] {
        let seen = coord
            .access()
            .read_node(&Node::with_id("A"), tx.snapshot())
            .expect("node A exists");
        tx.read_node(seen);
        let owner = i64::from(tx.client().0);
        tx.update(Node::with_id("A"), Node::with_id("A").with_property("owner", owner));
    }

    assert_eq!(
        coord.commit(first)?,
        CommitOutcome::Committed {
            sequence: SnapshotId(2),
            applied: 1
        }
    );
    assert_eq!(
        coord.commit(second)?,
        CommitOutcome::Aborted(AbortReason::NodeReadStale)
    );

    let counters = metrics.snapshot();
    assert_eq!(counters.committed, 2);
    assert_eq!(counters.aborted, 1);
    assert_eq!(counters.writes, 2);
    Ok(())
}

#[test]
fn replayed_log_continues_numbering() -> Result<()> {
    let log = Arc::new(WriteLog::new(8));
    for id in 1..=5 {
        let batch = vec![Operation::create(Node::with_id(format!("r{id}")))];
        log.append_global(SnapshotId(id), batch)?;
    }
    let coord = CommitCoordinator::with_log(
        Arc::clone(&log),
        Arc::new(MemoryGraph::new()),
        UnknownEntityPolicy::Skip,
    );
    assert_eq!(coord.last_sequence(), SnapshotId(5));

    let mut stale = coord.begin(ClientId(1));
    assert_eq!(stale.snapshot(), SnapshotId(5));
    stale.delete(Node::with_id("r5"));

    let mut tx = coord.begin(ClientId(2));
    tx.update(Node::with_id("r5"), Node::with_id("r5").with_property("v", 1i64));
    assert!(matches!(
        coord.commit(tx)?,
        CommitOutcome::Committed {
            sequence: SnapshotId(6),
            ..
        }
    ));
    assert_eq!(
        coord.commit(stale)?,
        CommitOutcome::Aborted(AbortReason::WriteWriteClash)
    );
    Ok(())
}

#[test]
fn coordinators_sharing_a_log_never_reuse_ids() -> Result<()> {
    let log = Arc::new(WriteLog::new(4));
    let graph = Arc::new(MemoryGraph::new());
    let first = CommitCoordinator::with_log(
        Arc::clone(&log),
        Arc::clone(&graph),
        UnknownEntityPolicy::Skip,
    );
    let second =
        CommitCoordinator::with_log(Arc::clone(&log), Arc::clone(&graph), UnknownEntityPolicy::Skip);
    log.append_global(SnapshotId(1), vec![Operation::create(Node::with_id("seed"))])?;

    let mut sequences = Vec::new();
    for round in 0..6 {
        let coord = if round % 2 == 0 { &first } else { &second };
        let mut tx = coord.begin(ClientId(round));
        tx.create(Node::with_id(format!("n{round}")));
        match coord.commit(tx)? {
            CommitOutcome::Committed { sequence, .. } => sequences.push(sequence.0),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(sequences, vec![2, 3, 4, 5, 6, 7]);
    assert_eq!(graph.node_count(), 6);
    assert_eq!(log.last_sequence(), SnapshotId(7));
    Ok(())
}

#[test]
fn skip_policy_commits_around_unknown_entities() -> Result<()> {
    let coord = coordinator(&ConsistencyConfig::default());
    let wire = br#"[
        {"op":"create","entity":{"type":"hyperedge","arity":3}},
        {"op":"delete","entity":{"type":"hyperedge"}}
    ]"#;
    let mut tx = coord.begin(ClientId(1));
    for op in codec::decode_batch(wire)? {
        tx.push_operation(op);
    }
    tx.create(Node::with_id("A"));

    assert_eq!(
        coord.commit(tx)?,
        CommitOutcome::Committed {
            sequence: SnapshotId(1),
            applied: 1
        }
    );
    assert_eq!(coord.access().node_count(), 1);
    assert_eq!(coord.log().recent_len(), 1);
    Ok(())
}

#[test]
fn reject_policy_fails_the_transaction() -> Result<()> {
    let config = Config::from_toml_str("[consistency]\nunknown_entity_policy = \"reject\"\n")?;
    let coord = coordinator(&config.consistency);
    let mut tx = coord.begin(ClientId(1));
    tx.create(Node::with_id("A"));
    tx.push_operation(codec::decode_operation(
        br#"{"op":"create","entity":{"type":"hyperedge"}}"#,
    )?);

    let err = coord.commit(tx).unwrap_err();
    assert!(matches!(err, GraphError::UnrecognizedEntity(ref kind) if kind == "hyperedge"));
    assert_eq!(coord.last_sequence(), SnapshotId::ZERO);
    assert_eq!(coord.access().node_count(), 0);
    Ok(())
}

#[test]
fn read_only_transaction_sees_live_state_change() -> Result<()> {
    let coord = coordinator(&ConsistencyConfig::default());
    let mut setup = coord.begin(ClientId(0));
    setup.create(Node::with_id("A"));
    coord.commit(setup)?;

    let mut reader = coord.begin(ClientId(1));
    let seen = coord
        .access()
        .read_node(&Node::with_id("A"), reader.snapshot())
        .expect("node A exists");
    reader.read_node(seen.clone());

    let mut again = coord.begin(ClientId(1));
    again.read_node(seen);
    assert_eq!(coord.commit(again)?, CommitOutcome::ReadOnly);

    coord.access().apply_delete_node(&Node::with_id("A"), SnapshotId(1), ClientId(9));
    assert_eq!(
        coord.commit(reader)?,
        CommitOutcome::Aborted(AbortReason::LiveStateMismatch)
    );
    Ok(())
}
