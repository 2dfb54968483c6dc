use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::db::AbortReason;

/// Trait for tracking transaction outcomes on a replica.
///
/// The commit path reports every decision here so operators can follow
/// throughput and abort causes without parsing logs.
pub trait CommitMetrics: Send + Sync {
    /// Records a committed transaction.
    fn committed(&self);

    /// Records an aborted transaction and the check that rejected it.
    fn aborted(&self, reason: AbortReason);

    /// Records entities read by a validated transaction.
    fn reads(&self, count: usize);

    /// Records operations written by a committed transaction.
    fn writes(&self, count: usize);

    /// Records time spent in conflict detection for one transaction.
    fn validation_time(&self, elapsed: Duration);

    /// Records time spent recording and applying one write batch.
    fn commit_time(&self, elapsed: Duration);
}

/// A no-op implementation of [`CommitMetrics`].
#[derive(Default)]
pub struct NoopMetrics;

impl CommitMetrics for NoopMetrics {
    fn committed(&self) {}
    fn aborted(&self, _reason: AbortReason) {}
    fn reads(&self, _count: usize) {}
    fn writes(&self, _count: usize) {}
    fn validation_time(&self, _elapsed: Duration) {}
    fn commit_time(&self, _elapsed: Duration) {}
}

/// A thread-safe counter-based implementation of [`CommitMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Transactions committed.
    pub committed: AtomicU64,
    /// Aborts caused by a stale node read.
    pub aborted_node_reads: AtomicU64,
    /// Aborts caused by a stale relationship read.
    pub aborted_relationship_reads: AtomicU64,
    /// Aborts caused by clashing writes.
    pub aborted_writes: AtomicU64,
    /// Aborts caused by the live-state hash check.
    pub aborted_live_state: AtomicU64,
    /// Entities read by validated transactions.
    pub reads: AtomicU64,
    /// Operations written by committed transactions.
    pub writes: AtomicU64,
    /// Nanoseconds spent validating.
    pub validation_nanos: AtomicU64,
    /// Validations timed.
    pub validations: AtomicU64,
    /// Nanoseconds spent recording and applying write batches.
    pub commit_nanos: AtomicU64,
    /// Write batches timed.
    pub timed_commits: AtomicU64,
}

/// Point-in-time copy of [`CounterMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitCounters {
    /// Transactions committed.
    pub committed: u64,
    /// Transactions aborted for any reason.
    pub aborted: u64,
    /// Aborts caused by clashing writes.
    pub aborted_writes: u64,
    /// Entities read.
    pub reads: u64,
    /// Operations written.
    pub writes: u64,
    /// Nanoseconds spent validating.
    pub validation_nanos: u64,
    /// Validations timed.
    pub validations: u64,
    /// Nanoseconds spent recording and applying write batches.
    pub commit_nanos: u64,
    /// Write batches timed.
    pub timed_commits: u64,
}

impl CommitCounters {
    /// Mean validation latency over the window.
    pub fn mean_validation(&self) -> Duration {
        mean(self.validation_nanos, self.validations)
    }

    /// Mean record-and-apply latency over the window.
    pub fn mean_commit(&self) -> Duration {
        mean(self.commit_nanos, self.timed_commits)
    }
}

fn mean(total_nanos: u64, samples: u64) -> Duration {
    match total_nanos.checked_div(samples) {
        Some(nanos) => Duration::from_nanos(nanos),
        None => Duration::ZERO,
    }
}

fn saturating_nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

impl CounterMetrics {
    /// Reads all counters.
    pub fn snapshot(&self) -> CommitCounters {
        let aborted_writes = self.aborted_writes.load(Ordering::Relaxed);
        CommitCounters {
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted_node_reads.load(Ordering::Relaxed)
                + self.aborted_relationship_reads.load(Ordering::Relaxed)
                + aborted_writes
                + self.aborted_live_state.load(Ordering::Relaxed),
            aborted_writes,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            validation_nanos: self.validation_nanos.load(Ordering::Relaxed),
            validations: self.validations.load(Ordering::Relaxed),
            commit_nanos: self.commit_nanos.load(Ordering::Relaxed),
            timed_commits: self.timed_commits.load(Ordering::Relaxed),
        }
    }

    /// Reads all counters and resets them to zero for the next measurement window.
    pub fn take(&self) -> CommitCounters {
        let aborted_writes = self.aborted_writes.swap(0, Ordering::Relaxed);
        CommitCounters {
            committed: self.committed.swap(0, Ordering::Relaxed),
            aborted: self.aborted_node_reads.swap(0, Ordering::Relaxed)
                + self.aborted_relationship_reads.swap(0, Ordering::Relaxed)
                + aborted_writes
                + self.aborted_live_state.swap(0, Ordering::Relaxed),
            aborted_writes,
            reads: self.reads.swap(0, Ordering::Relaxed),
            writes: self.writes.swap(0, Ordering::Relaxed),
            validation_nanos: self.validation_nanos.swap(0, Ordering::Relaxed),
            validations: self.validations.swap(0, Ordering::Relaxed),
            commit_nanos: self.commit_nanos.swap(0, Ordering::Relaxed),
            timed_commits: self.timed_commits.swap(0, Ordering::Relaxed),
        }
    }
}

impl CommitMetrics for CounterMetrics {
    fn committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    fn aborted(&self, reason: AbortReason) {
        let counter = match reason {
            AbortReason::NodeReadStale => &self.aborted_node_reads,
            AbortReason::RelationshipReadStale => &self.aborted_relationship_reads,
            AbortReason::WriteWriteClash => &self.aborted_writes,
            AbortReason::LiveStateMismatch => &self.aborted_live_state,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reads(&self, count: usize) {
        self.reads.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn writes(&self, count: usize) {
        self.writes.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn validation_time(&self, elapsed: Duration) {
        self.validation_nanos
            .fetch_add(saturating_nanos(elapsed), Ordering::Relaxed);
        self.validations.fetch_add(1, Ordering::Relaxed);
    }

    fn commit_time(&self, elapsed: Duration) {
        self.commit_nanos
            .fetch_add(saturating_nanos(elapsed), Ordering::Relaxed);
        self.timed_commits.fetch_add(1, Ordering::Relaxed);
    }
}
