use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::write_log::DEFAULT_RECENT_CAPACITY;
use crate::storage::UnknownEntityPolicy;
use crate::types::{GraphError, Result};

/// Commit-path settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Batches kept in the recent tier of the write log before spilling.
    pub recent_capacity: usize,
    /// Handling of operations whose entity cannot be applied.
    pub unknown_entity_policy: UnknownEntityPolicy,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            unknown_entity_policy: UnknownEntityPolicy::Skip,
        }
    }
}

/// Quorum certificate settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    /// Distinct replica signatures needed before a decision is safe.
    pub required_signatures: usize,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            required_signatures: 3,
        }
    }
}

impl QuorumConfig {
    /// Threshold `2f + 1` for a cluster of `replicas = 3f + 1` members.
    pub fn byzantine(replicas: usize) -> Self {
        let faulty = replicas.saturating_sub(1) / 3;
        Self {
            required_signatures: 2 * faulty + 1,
        }
    }
}

/// Reconfiguration monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Number of local clusters reporting to the global cluster.
    pub cluster_count: usize,
    /// Evaluation period in milliseconds.
    pub interval_ms: u64,
    /// CPU usage above which a replica with high memory is overloaded.
    pub border_cpu_usage: f64,
    /// How far below `border_cpu_usage` the second tier starts.
    pub cpu_second_tier_offset: f64,
    /// Memory (bytes) that, with CPU above the border, marks overload.
    pub memory_high_watermark: u64,
    /// Memory (bytes) that, with CPU above the lowered border, marks overload.
    pub memory_critical_watermark: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cluster_count: 3,
            interval_ms: 1000,
            border_cpu_usage: 0.9,
            cpu_second_tier_offset: 0.5,
            memory_high_watermark: 1_800_000_000,
            memory_critical_watermark: 2_000_000_000,
        }
    }
}

impl MonitorConfig {
    /// Evaluation period.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Reports needed before the monitor evaluates: a strict majority.
    pub fn majority(&self) -> usize {
        self.cluster_count / 2 + 1
    }
}

/// Top-level configuration.
///
/// Every section falls back to its defaults when absent from the file.
///
/// ```toml
/// [consistency]
/// recent_capacity = 100
/// unknown_entity_policy = "reject"
///
/// [quorum]
/// required_signatures = 5
///
/// [monitor]
/// cluster_count = 5
/// border_cpu_usage = 0.85
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Commit path.
    pub consistency: ConsistencyConfig,
    /// Quorum certificates.
    pub quorum: QuorumConfig,
    /// Reconfiguration monitor.
    pub monitor: MonitorConfig,
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|err| GraphError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| GraphError::Config(err.to_string()))
    }

    /// Rejects values the components cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.quorum.required_signatures == 0 {
            return Err(GraphError::Config(
                "quorum.required_signatures must be positive".into(),
            ));
        }
        let monitor = &self.monitor;
        if monitor.cluster_count == 0 {
            return Err(GraphError::Config(
                "monitor.cluster_count must be positive".into(),
            ));
        }
        if monitor.interval_ms == 0 {
            return Err(GraphError::Config("monitor.interval_ms must be positive".into()));
        }
        if !monitor.border_cpu_usage.is_finite() || !monitor.cpu_second_tier_offset.is_finite() {
            return Err(GraphError::Config("monitor cpu thresholds must be finite".into()));
        }
        if monitor.cpu_second_tier_offset < 0.0 {
            return Err(GraphError::Config(
                "monitor.cpu_second_tier_offset must not be negative".into(),
            ));
        }
        Ok(())
    }
}
