//! Optimistic-concurrency validation of a transaction at commit time.
//!
//! A transaction reading at snapshot `s` may commit only if nothing committed
//! after `s` touches what it read or what it intends to update or delete, and
//! if the database still hashes its reads to the values it observed. Writes
//! recorded at exactly `s` are part of the snapshot and never conflict.

use std::cell::OnceCell;
use std::fmt;
use std::ops::Bound::{Excluded, Unbounded};

use tracing::{info, warn};

use super::transaction::TransactionContext;
use super::write_log::{Batches, LogView};
use crate::model::{Entity, Node, Relationship};
use crate::storage::{DatabaseAccess, Operation};
use crate::types::SnapshotId;

/// Which validation step rejected a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    /// A node in the read set was written after the snapshot.
    NodeReadStale,
    /// A relationship in the read set was written after the snapshot.
    RelationshipReadStale,
    /// A pending update or delete collides with a later committed write.
    WriteWriteClash,
    /// The database no longer hashes a read entity to the observed value.
    LiveStateMismatch,
}

impl AbortReason {
    /// Stable name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            AbortReason::NodeReadStale => "node_read",
            AbortReason::RelationshipReadStale => "relationship_read",
            AbortReason::WriteWriteClash => "write_write",
            AbortReason::LiveStateMismatch => "live_state",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictVerdict {
    /// No conflict; the transaction may commit.
    Commit,
    /// The transaction must abort.
    Abort(AbortReason),
}

impl ConflictVerdict {
    /// `true` for [`ConflictVerdict::Commit`].
    pub fn is_commit(self) -> bool {
        matches!(self, ConflictVerdict::Commit)
    }

    /// The abort reason, if any.
    pub fn abort_reason(self) -> Option<AbortReason> {
        match self {
            ConflictVerdict::Commit => None,
            ConflictVerdict::Abort(reason) => Some(reason),
        }
    }
}

fn collect_future<'a>(
    global: &'a Batches,
    recent: &'a Batches,
    snapshot: SnapshotId,
) -> Vec<&'a Operation> {
    let after = (Excluded(snapshot), Unbounded);
    global
        .range(after)
        .chain(recent.range(after))
        .flat_map(|(_, ops)| ops.iter())
        .collect()
}

fn any_conflict(future: &[&Operation], entities: &[Entity]) -> bool {
    future
        .iter()
        .any(|op| entities.iter().any(|entity| op.conflicts_with(entity)))
}

/// Decides whether a transaction reading at `snapshot` may commit.
///
/// Steps, in order, each skipped when its input is empty:
///
/// 1. node reads against operations committed after `snapshot`;
/// 2. relationship reads against the same operations;
/// 3. the transaction's own updates and deletes against the same operations;
/// 4. `access.equal_hash` over both read sets.
///
/// The later-committed operations are gathered once from `global` and
/// `recent` and shared by steps 1–3. Nothing is mutated, so independent
/// transactions may be checked in parallel against the same view.
pub fn check_for_conflict<A: DatabaseAccess + ?Sized>(
    global: &Batches,
    recent: &Batches,
    local_ops: &[Operation],
    read_nodes: &[Node],
    read_relationships: &[Relationship],
    snapshot: SnapshotId,
    access: &A,
) -> ConflictVerdict {
    let future_cell = OnceCell::new();
    let future = || future_cell.get_or_init(|| collect_future(global, recent, snapshot));

    let node_entities: Vec<Entity> = read_nodes.iter().cloned().map(Entity::Node).collect();
    if !node_entities.is_empty() && any_conflict(future(), &node_entities) {
        info!(%snapshot, reads = node_entities.len(), "conflict.abort.node_read");
        return ConflictVerdict::Abort(AbortReason::NodeReadStale);
    }

    let rel_entities: Vec<Entity> = read_relationships
        .iter()
        .cloned()
        .map(Entity::Relationship)
        .collect();
    if !rel_entities.is_empty() && any_conflict(future(), &rel_entities) {
        info!(%snapshot, reads = rel_entities.len(), "conflict.abort.relationship_read");
        return ConflictVerdict::Abort(AbortReason::RelationshipReadStale);
    }

    let clashing: Vec<Entity> = local_ops
        .iter()
        .filter(|op| op.is_write_conflict_candidate())
        .map(|op| op.entity().clone())
        .collect();
    if !clashing.is_empty() && any_conflict(future(), &clashing) {
        info!(%snapshot, writes = clashing.len(), "conflict.abort.write_write");
        return ConflictVerdict::Abort(AbortReason::WriteWriteClash);
    }

    let nodes_current = node_entities.is_empty() || access.equal_hash(&node_entities);
    let rels_current = rel_entities.is_empty() || access.equal_hash(&rel_entities);
    if !(nodes_current && rels_current) {
        warn!(%snapshot, "conflict.abort.live_state");
        return ConflictVerdict::Abort(AbortReason::LiveStateMismatch);
    }

    ConflictVerdict::Commit
}

/// Boolean form of [`check_for_conflict`]: `true` iff the transaction may commit.
pub fn may_commit<A: DatabaseAccess + ?Sized>(
    global: &Batches,
    recent: &Batches,
    local_ops: &[Operation],
    read_nodes: &[Node],
    read_relationships: &[Relationship],
    snapshot: SnapshotId,
    access: &A,
) -> bool {
    check_for_conflict(
        global,
        recent,
        local_ops,
        read_nodes,
        read_relationships,
        snapshot,
        access,
    )
    .is_commit()
}

/// Validates a transaction context against a captured log view.
pub fn check_transaction<A: DatabaseAccess + ?Sized>(
    view: &LogView,
    tx: &TransactionContext,
    access: &A,
) -> ConflictVerdict {
    check_for_conflict(
        &view.global,
        &view.recent,
        tx.operations(),
        tx.node_reads(),
        tx.relationship_reads(),
        tx.snapshot(),
        access,
    )
}
