//! Load aggregation and algorithm reconfiguration for the global cluster.
//!
//! Local clusters periodically report per-replica [`LoadDescriptor`]s. The
//! [`ReconfigurationMonitor`] gathers one round of reports and, once a
//! majority of clusters has reported, asks the [`Primary`] to switch
//! algorithms when enough slaves are overloaded.

mod load;
mod monitor;
mod worker;

pub use load::{ClusterLoads, LoadDescriptor, OverloadThresholds, PerformanceMap};
pub use monitor::{Evaluation, Primary, ReconfigurationMonitor};
pub use worker::{MonitorHandle, MonitorWorker};
