use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::config::ConsistencyConfig;
use super::conflict::{check_transaction, AbortReason, ConflictVerdict};
use super::transaction::TransactionContext;
use super::write_log::WriteLog;
use crate::storage::{apply_batch, CommitMetrics, DatabaseAccess, NoopMetrics, UnknownEntityPolicy};
use crate::types::{ClientId, GraphError, Result, SnapshotId};

/// Result of [`CommitCoordinator::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Writes were recorded at `sequence`; `applied` of them were accepted by
    /// the database.
    Committed {
        /// Sequence id assigned to the batch.
        sequence: SnapshotId,
        /// Operations the database accepted.
        applied: usize,
    },
    /// A transaction without writes passed validation.
    ReadOnly,
    /// Validation failed.
    Aborted(AbortReason),
}

impl CommitOutcome {
    /// `true` unless the transaction aborted.
    pub fn is_success(&self) -> bool {
        !matches!(self, CommitOutcome::Aborted(_))
    }
}

/// Validates transactions and records committed batches on one replica.
///
/// Read-only transactions are checked against a view of the log and never
/// take the commit lock. Write transactions are checked, numbered, recorded
/// and applied while holding it. The next sequence id follows whichever is
/// higher of the last id this coordinator assigned and the log's own tail, so
/// batches replayed into a shared log are never shadowed. A batch is in the
/// log before the database sees it.
pub struct CommitCoordinator<A: DatabaseAccess> {
    log: Arc<WriteLog>,
    access: Arc<A>,
    metrics: Arc<dyn CommitMetrics>,
    policy: UnknownEntityPolicy,
    last_assigned: Mutex<SnapshotId>,
}

impl<A: DatabaseAccess> CommitCoordinator<A> {
    /// Creates a coordinator with a fresh write log sized from `config`.
    pub fn new(access: Arc<A>, config: &ConsistencyConfig) -> Self {
        let log = Arc::new(WriteLog::new(config.recent_capacity));
        Self::with_log(log, access, config.unknown_entity_policy)
    }

    /// Creates a coordinator over an existing log, e.g. one replayed on
    /// startup. Numbering continues after the log's last sequence id.
    pub fn with_log(log: Arc<WriteLog>, access: Arc<A>, policy: UnknownEntityPolicy) -> Self {
        let last = log.last_sequence();
        Self {
            log,
            access,
            metrics: Arc::new(NoopMetrics),
            policy,
            last_assigned: Mutex::new(last),
        }
    }

    /// Replaces the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn CommitMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The shared write log.
    pub fn log(&self) -> &Arc<WriteLog> {
        &self.log
    }

    /// The storage backend.
    pub fn access(&self) -> &Arc<A> {
        &self.access
    }

    /// Latest committed sequence id, including batches appended to the log
    /// by other writers.
    pub fn last_sequence(&self) -> SnapshotId {
        let last = self.last_assigned.lock();
        (*last).max(self.log.last_sequence())
    }

    /// Starts a transaction reading at the latest committed sequence id.
    pub fn begin(&self, client: ClientId) -> TransactionContext {
        TransactionContext::new(self.last_sequence(), client)
    }

    /// Validates `tx` and, when it carries writes, records and applies them.
    ///
    /// Conflicts are reported as [`CommitOutcome::Aborted`]. Errors are
    /// reserved for batches the configured [`UnknownEntityPolicy`] refuses
    /// and for log ordering failures; nothing is recorded in either case.
    pub fn commit(&self, tx: TransactionContext) -> Result<CommitOutcome> {
        self.metrics.reads(tx.read_count());

        if tx.is_read_only() {
            let verdict = self.validate(&tx);
            return Ok(match verdict {
                ConflictVerdict::Commit => {
                    self.metrics.committed();
                    CommitOutcome::ReadOnly
                }
                ConflictVerdict::Abort(reason) => self.abort(&tx, reason),
            });
        }

        if self.policy == UnknownEntityPolicy::Reject {
            if let Some(op) = tx.operations().iter().find(|op| !op.is_applicable()) {
                return Err(GraphError::UnrecognizedEntity(op.entity().type_name().to_owned()));
            }
        }

        let mut last = self.last_assigned.lock();
        if let ConflictVerdict::Abort(reason) = self.validate(&tx) {
            return Ok(self.abort(&tx, reason));
        }

        let started = Instant::now();
        let sequence = (*last).max(self.log.last_sequence()).next();
        let client = tx.client();
        let ops = tx.into_operations();
        let writes = ops.len();
        let batch = self.log.append_recent(sequence, ops)?;
        *last = sequence;
        let outcome = apply_batch(&batch, &*self.access, sequence, client, self.policy)?;
        drop(last);
        self.metrics.commit_time(started.elapsed());

        self.log.spill_overflow();
        self.metrics.committed();
        self.metrics.writes(writes);
        debug!(
            %sequence,
            %client,
            applied = outcome.applied,
            not_applied = outcome.not_applied,
            "commit.recorded"
        );
        Ok(CommitOutcome::Committed {
            sequence,
            applied: outcome.applied,
        })
    }

    fn validate(&self, tx: &TransactionContext) -> ConflictVerdict {
        let started = Instant::now();
        let view = self.log.view_after(tx.snapshot());
        let verdict = check_transaction(&view, tx, &*self.access);
        self.metrics.validation_time(started.elapsed());
        verdict
    }

    fn abort(&self, tx: &TransactionContext, reason: AbortReason) -> CommitOutcome {
        self.metrics.aborted(reason);
        info!(
            snapshot = %tx.snapshot(),
            client = %tx.client(),
            reason = reason.as_str(),
            "commit.aborted"
        );
        CommitOutcome::Aborted(reason)
    }
}
