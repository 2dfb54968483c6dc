//! Consistency and control layer for a Byzantine-fault-tolerant replicated
//! graph database.
//!
//! * [`db`] validates optimistic transactions against the write log and
//!   commits them;
//! * [`consensus`] collects replica signatures into quorum certificates;
//! * [`reconfig`] watches replica load and asks the global cluster to switch
//!   algorithms under pressure.

#![warn(missing_docs)]

pub mod consensus;
pub mod db;
pub mod logging;
pub mod model;
pub mod reconfig;
pub mod storage;
pub mod types;

pub use db::{CommitCoordinator, CommitOutcome, Config, TransactionContext};
pub use types::{GraphError, Result};
