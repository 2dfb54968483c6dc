use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::storage::Operation;
use crate::types::{GraphError, Result, SnapshotId};

/// Committed batches keyed by the sequence id they committed at.
pub type Batches = BTreeMap<SnapshotId, Arc<[Operation]>>;

/// Default bound on the recent tier.
pub const DEFAULT_RECENT_CAPACITY: usize = 50;

/// Batches committed after some snapshot, captured from both tiers at once.
#[derive(Debug, Clone, Default)]
pub struct LogView {
    /// Batches from the durable tier.
    pub global: Batches,
    /// Batches still in the recent tier.
    pub recent: Batches,
}

impl LogView {
    /// Number of batches in the view.
    pub fn len(&self) -> usize {
        self.global.len() + self.recent.len()
    }

    /// `true` when nothing committed after the snapshot.
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.recent.is_empty()
    }
}

/// Append-only, time-ordered record of committed operation batches.
///
/// New commits land in the bounded recent tier and are later spilled into the
/// unbounded global tier. Both tiers sit behind their own lock; whenever both
/// are taken the recent lock is acquired first, so a [`WriteLog::view_after`]
/// never observes a batch mid-move.
pub struct WriteLog {
    global: RwLock<Batches>,
    recent: RwLock<Batches>,
    recent_capacity: usize,
}

impl Default for WriteLog {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

impl WriteLog {
    /// Creates an empty log whose recent tier holds up to `recent_capacity` batches.
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            global: RwLock::new(Batches::new()),
            recent: RwLock::new(Batches::new()),
            recent_capacity,
        }
    }

    /// Configured bound on the recent tier.
    pub fn recent_capacity(&self) -> usize {
        self.recent_capacity
    }

    /// Highest sequence id recorded in either tier.
    pub fn last_sequence(&self) -> SnapshotId {
        let recent = self.recent.read();
        let global = self.global.read();
        last_of(&recent).max(last_of(&global))
    }

    /// Records a freshly committed batch in the recent tier.
    ///
    /// `id` must exceed every id already in the log. Returns the stored batch.
    pub fn append_recent(&self, id: SnapshotId, ops: Vec<Operation>) -> Result<Arc<[Operation]>> {
        let mut recent = self.recent.write();
        let last = last_of(&recent).max(last_of(&self.global.read()));
        if id <= last {
            return Err(GraphError::SequenceOutOfOrder { last, got: id });
        }
        let batch: Arc<[Operation]> = ops.into();
        recent.insert(id, Arc::clone(&batch));
        Ok(batch)
    }

    /// Records a batch directly in the global tier, e.g. when replaying a
    /// durable log on startup.
    pub fn append_global(&self, id: SnapshotId, ops: Vec<Operation>) -> Result<()> {
        let recent = self.recent.read();
        let mut global = self.global.write();
        let last = last_of(&recent).max(last_of(&global));
        if id <= last {
            return Err(GraphError::SequenceOutOfOrder { last, got: id });
        }
        global.insert(id, ops.into());
        Ok(())
    }

    /// Captures every batch committed strictly after `snapshot`.
    pub fn view_after(&self, snapshot: SnapshotId) -> LogView {
        let recent = self.recent.read();
        let global = self.global.read();
        LogView {
            global: range_after(&global, snapshot),
            recent: range_after(&recent, snapshot),
        }
    }

    /// Number of batches in the recent tier.
    pub fn recent_len(&self) -> usize {
        self.recent.read().len()
    }

    /// Number of batches in the global tier.
    pub fn global_len(&self) -> usize {
        self.global.read().len()
    }

    /// Moves the oldest recent batches into the global tier until the recent
    /// tier is back within its bound. Returns the number of batches moved.
    pub fn spill_overflow(&self) -> usize {
        self.move_oldest(|len, capacity| len > capacity)
    }

    /// Moves every recent batch into the global tier.
    pub fn merge_all(&self) -> usize {
        self.move_oldest(|len, _| len > 0)
    }

    fn move_oldest(&self, keep_going: impl Fn(usize, usize) -> bool) -> usize {
        let mut recent = self.recent.write();
        let mut global = self.global.write();
        let mut moved = 0;
        while keep_going(recent.len(), self.recent_capacity) {
            let Some((id, ops)) = recent.pop_first() else {
                break;
            };
            global.insert(id, ops);
            moved += 1;
        }
        if moved > 0 {
            debug!(
                moved,
                recent = recent.len(),
                global = global.len(),
                "write_log.spill"
            );
        }
        moved
    }
}

fn last_of(batches: &Batches) -> SnapshotId {
    batches
        .last_key_value()
        .map(|(id, _)| *id)
        .unwrap_or(SnapshotId::ZERO)
}

fn range_after(batches: &Batches, snapshot: SnapshotId) -> Batches {
    batches
        .range((Excluded(snapshot), Unbounded))
        .map(|(id, ops)| (*id, Arc::clone(ops)))
        .collect()
}
