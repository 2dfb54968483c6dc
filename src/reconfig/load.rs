use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::MonitorConfig;
use crate::types::{ClusterId, ReplicaId};

/// Resource usage reported by one replica.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadDescriptor {
    /// CPU usage as a fraction of one, e.g. `0.95`.
    pub cpu_usage: f64,
    /// Allocated memory in bytes.
    pub allocated_memory: u64,
    /// Whether the replica serves as a slave in its local cluster.
    pub slave: bool,
}

impl LoadDescriptor {
    /// Load of a slave replica.
    pub fn slave(cpu_usage: f64, allocated_memory: u64) -> Self {
        Self {
            cpu_usage,
            allocated_memory,
            slave: true,
        }
    }

    /// Load of a primary replica. Never counted by the monitor.
    pub fn primary(cpu_usage: f64, allocated_memory: u64) -> Self {
        Self {
            cpu_usage,
            allocated_memory,
            slave: false,
        }
    }
}

/// Loads of the replicas of one local cluster.
pub type ClusterLoads = BTreeMap<ReplicaId, LoadDescriptor>;

/// Loads of every local cluster that reported in the current round.
pub type PerformanceMap = BTreeMap<ClusterId, ClusterLoads>;

/// Two-tier overload predicate.
///
/// A replica is overloaded when its CPU exceeds `border_cpu_usage` while
/// memory exceeds `memory_high_watermark`, or when its CPU exceeds
/// `border_cpu_usage - cpu_second_tier_offset` while memory exceeds
/// `memory_critical_watermark`. All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverloadThresholds {
    /// CPU border of the first tier.
    pub border_cpu_usage: f64,
    /// Amount the second tier lowers the CPU border by.
    pub cpu_second_tier_offset: f64,
    /// Memory bound of the first tier, in bytes.
    pub memory_high_watermark: u64,
    /// Memory bound of the second tier, in bytes.
    pub memory_critical_watermark: u64,
}

impl Default for OverloadThresholds {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for OverloadThresholds {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            border_cpu_usage: config.border_cpu_usage,
            cpu_second_tier_offset: config.cpu_second_tier_offset,
            memory_high_watermark: config.memory_high_watermark,
            memory_critical_watermark: config.memory_critical_watermark,
        }
    }
}

impl OverloadThresholds {
    /// Whether `load` counts as overloaded.
    pub fn is_overloaded(&self, load: &LoadDescriptor) -> bool {
        let first_tier = load.cpu_usage > self.border_cpu_usage
            && load.allocated_memory > self.memory_high_watermark;
        let second_tier = load.cpu_usage > self.border_cpu_usage - self.cpu_second_tier_offset
            && load.allocated_memory > self.memory_critical_watermark;
        first_tier || second_tier
    }
}
