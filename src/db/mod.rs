//! Transaction validation and the commit path of a replica.

mod commit;
mod config;
mod conflict;
mod transaction;
mod write_log;

pub use commit::{CommitCoordinator, CommitOutcome};
pub use config::{Config, ConsistencyConfig, MonitorConfig, QuorumConfig};
pub use conflict::{check_for_conflict, check_transaction, may_commit, AbortReason, ConflictVerdict};
pub use transaction::TransactionContext;
pub use write_log::{Batches, LogView, WriteLog, DEFAULT_RECENT_CAPACITY};
