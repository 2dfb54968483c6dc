#![allow(missing_docs)]

use bftgraph::db::{
    check_for_conflict, check_transaction, may_commit, AbortReason, Batches, ConflictVerdict,
    TransactionContext, WriteLog,
};
use bftgraph::model::{Entity, Node, Relationship};
use bftgraph::storage::{DatabaseAccess, MemoryGraph, Operation};
use bftgraph::types::{ClientId, SnapshotId};

/// Backend whose live state always agrees with what was read.
struct Agreeing;

impl DatabaseAccess for Agreeing {
    fn apply_create_node(&self, _: &Node, _: SnapshotId, _: ClientId) -> bool {
        true
    }
    fn apply_create_relationship(&self, _: &Relationship, _: SnapshotId, _: ClientId) -> bool {
        true
    }
    fn apply_update_node(&self, _: &Node, _: &Node, _: SnapshotId, _: ClientId) -> bool {
        true
    }
    fn apply_update_relationship(
        &self,
        _: &Relationship,
        _: &Relationship,
        _: SnapshotId,
        _: ClientId,
    ) -> bool {
        true
    }
    fn apply_delete_node(&self, _: &Node, _: SnapshotId, _: ClientId) -> bool {
        true
    }
    fn apply_delete_relationship(&self, _: &Relationship, _: SnapshotId, _: ClientId) -> bool {
        true
    }
    fn equal_hash(&self, _: &[Entity]) -> bool {
        true
    }
}

fn single(id: u64, op: Operation) -> Batches {
    [(SnapshotId(id), vec![op].into())].into_iter().collect()
}

#[test]
fn read_then_later_update_aborts() {
    let graph = MemoryGraph::new();
    let log = WriteLog::default();
    graph.apply_create_node(&Node::with_id("A"), SnapshotId(1), ClientId(0));
    log.append_global(SnapshotId(1), vec![Operation::create(Node::with_id("A"))])
        .unwrap();

    let seen = graph.read_node(&Node::with_id("A"), SnapshotId(10)).unwrap();
    let mut tx = TransactionContext::new(SnapshotId(10), ClientId(1));
    tx.read_node(seen);

    let update = Operation::update(Node::with_id("A"), Node::with_id("A").with_property("age", 3i64));
    update
        .apply(&graph, SnapshotId(11), ClientId(2), Default::default())
        .unwrap();
    log.append_recent(SnapshotId(11), vec![update]).unwrap();

    let verdict = check_transaction(&log.view_after(tx.snapshot()), &tx, &graph);
    assert_eq!(verdict, ConflictVerdict::Abort(AbortReason::NodeReadStale));
}

#[test]
fn update_before_snapshot_commits() {
    let graph = MemoryGraph::new();
    let log = WriteLog::default();
    graph.apply_create_node(&Node::with_id("A"), SnapshotId(1), ClientId(0));
    log.append_global(SnapshotId(1), vec![Operation::create(Node::with_id("A"))])
        .unwrap();

    let update = Operation::update(Node::with_id("A"), Node::with_id("A").with_property("age", 3i64));
    update
        .apply(&graph, SnapshotId(9), ClientId(2), Default::default())
        .unwrap();
    log.append_recent(SnapshotId(9), vec![update]).unwrap();

    let seen = graph.read_node(&Node::with_id("A"), SnapshotId(10)).unwrap();
    let mut tx = TransactionContext::new(SnapshotId(10), ClientId(1));
    tx.read_node(seen);

    let verdict = check_transaction(&log.view_after(tx.snapshot()), &tx, &graph);
    assert_eq!(verdict, ConflictVerdict::Commit);
}

#[test]
fn delete_right_after_snapshot_aborts_reader() {
    for s in [0u64, 1, 41, 1_000_000] {
        let global = single(s + 1, Operation::delete(Node::with_id("n")));
        assert!(!may_commit(
            &global,
            &Batches::new(),
            &[],
            &[Node::with_id("n")],
            &[],
            SnapshotId(s),
            &Agreeing,
        ));
    }
}

#[test]
fn update_against_concurrent_delete_is_write_write_clash() {
    let recent = single(6, Operation::delete(Node::with_id("n")));
    let local = [Operation::update(
        Node::with_id("n"),
        Node::with_id("n").with_property("v", 2i64),
    )];
    let verdict = check_for_conflict(
        &Batches::new(),
        &recent,
        &local,
        &[],
        &[],
        SnapshotId(5),
        &Agreeing,
    );
    assert_eq!(verdict, ConflictVerdict::Abort(AbortReason::WriteWriteClash));
}

#[test]
fn fresh_create_ignores_concurrent_activity() {
    let global: Batches = [
        (SnapshotId(6), vec![Operation::delete(Node::with_id("n"))].into()),
        (SnapshotId(7), vec![Operation::create(Node::with_id("n2"))].into()),
        (
            SnapshotId(8),
            vec![Operation::update(Node::with_id("n2"), Node::with_id("n2"))].into(),
        ),
    ]
    .into_iter()
    .collect();
    let local = [Operation::create(Node::with_id("n2"))];
    assert!(may_commit(
        &global,
        &Batches::new(),
        &local,
        &[],
        &[],
        SnapshotId(5),
        &Agreeing,
    ));
}

#[test]
fn node_delete_conflicts_with_relationship_read_at_either_end() {
    let global = single(3, Operation::delete(Node::with_id("A")));
    for rel in [
        Relationship::new("KNOWS", Node::with_id("A"), Node::with_id("B")),
        Relationship::new("KNOWS", Node::with_id("B"), Node::with_id("A")),
    ] {
        let verdict = check_for_conflict(
            &global,
            &Batches::new(),
            &[],
            &[],
            &[rel],
            SnapshotId(2),
            &Agreeing,
        );
        assert_eq!(verdict, ConflictVerdict::Abort(AbortReason::RelationshipReadStale));
    }

    let unrelated = Relationship::new("KNOWS", Node::with_id("B"), Node::with_id("C"));
    assert!(may_commit(
        &global,
        &Batches::new(),
        &[],
        &[],
        &[unrelated],
        SnapshotId(2),
        &Agreeing,
    ));
}

#[test]
fn relationship_delete_conflicts_with_endpoint_read() {
    let rel = Relationship::new("KNOWS", Node::with_id("A"), Node::with_id("B"));
    let global = single(3, Operation::delete(rel));
    let verdict = check_for_conflict(
        &global,
        &Batches::new(),
        &[],
        &[Node::with_id("B")],
        &[],
        SnapshotId(2),
        &Agreeing,
    );
    assert_eq!(verdict, ConflictVerdict::Abort(AbortReason::NodeReadStale));
}

#[test]
fn live_state_mismatch_aborts_without_log_evidence() {
    let graph = MemoryGraph::new();
    graph.apply_create_node(&Node::with_id("A"), SnapshotId(1), ClientId(0));
    let seen = graph.read_node(&Node::with_id("A"), SnapshotId(1)).unwrap();

    // Changed behind the log's back.
    graph.apply_update_node(
        &Node::with_id("A"),
        &Node::with_id("A").with_property("age", 9i64),
        SnapshotId(2),
        ClientId(0),
    );

    let verdict = check_for_conflict(
        &Batches::new(),
        &Batches::new(),
        &[],
        &[seen],
        &[],
        SnapshotId(1),
        &graph,
    );
    assert_eq!(verdict, ConflictVerdict::Abort(AbortReason::LiveStateMismatch));
}

#[test]
fn incomparable_property_sets_do_not_conflict() {
    let global = single(
        3,
        Operation::update(
            Node::with_id("A").with_property("age", 3i64),
            Node::with_id("A").with_property("age", 4i64),
        ),
    );
    let read = Node::with_id("A").with_property("name", "alice");
    assert!(may_commit(
        &global,
        &Batches::new(),
        &[],
        &[read],
        &[],
        SnapshotId(2),
        &Agreeing,
    ));
}
