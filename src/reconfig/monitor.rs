use std::sync::Arc;

use tracing::{debug, warn};

use super::load::{ClusterLoads, OverloadThresholds, PerformanceMap};
use crate::db::MonitorConfig;
use crate::types::ClusterId;

/// The global-cluster replica the monitor reports to.
pub trait Primary: Send + Sync {
    /// Switches the cluster to its alternate consistency algorithm.
    fn adapt_algorithm(&self);
}

/// Result of one [`ReconfigurationMonitor::evaluate`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Fewer than a majority of clusters reported, or the round was already
    /// evaluated.
    Skipped,
    /// The round was evaluated and did not warrant adaptation.
    Stable {
        /// Overloaded slaves.
        overloaded: usize,
        /// Slaves counted.
        slaves: usize,
    },
    /// The round was evaluated and the primary was asked to adapt.
    Adapted {
        /// Overloaded slaves.
        overloaded: usize,
        /// Slaves counted.
        slaves: usize,
    },
}

/// Aggregates load reports from local clusters and decides when the global
/// cluster should switch algorithms.
///
/// Reports are grouped into rounds. A report for a new, non-zero round
/// discards what was gathered for the previous one; round `0` means "no
/// round information" and joins the current round. Each round is evaluated
/// at most once, as soon as a majority of clusters have reported.
pub struct ReconfigurationMonitor<P: Primary> {
    instance: u64,
    performance: PerformanceMap,
    has_new_data: bool,
    cluster_count: usize,
    thresholds: OverloadThresholds,
    primary: Arc<P>,
}

impl<P: Primary> ReconfigurationMonitor<P> {
    /// Creates a monitor for a global cluster fed by `config.cluster_count`
    /// local clusters.
    pub fn new(primary: Arc<P>, config: &MonitorConfig) -> Self {
        Self {
            instance: 0,
            performance: PerformanceMap::new(),
            has_new_data: true,
            cluster_count: config.cluster_count,
            thresholds: OverloadThresholds::from(config),
            primary,
        }
    }

    /// Records the loads `cluster` reported for round `instance`.
    pub fn add_report(&mut self, cluster: ClusterId, loads: ClusterLoads, instance: u64) {
        if instance != 0 && instance != self.instance {
            debug!(
                previous = self.instance,
                instance,
                dropped = self.performance.len(),
                "monitor.round.reset"
            );
            self.performance.clear();
            self.has_new_data = true;
            self.instance = instance;
        }
        self.performance.insert(cluster, loads);
    }

    /// Evaluates the current round if a majority reported and it has not been
    /// evaluated yet.
    ///
    /// Adaptation is requested when at least half (rounded down) of the
    /// reporting slaves are overloaded. Rounds without any slave never adapt.
    pub fn evaluate(&mut self) -> Evaluation {
        let majority = self.cluster_count / 2 + 1;
        if !self.has_new_data || self.performance.len() < majority {
            return Evaluation::Skipped;
        }

        let mut slaves = 0;
        let mut overloaded = 0;
        for load in self.performance.values().flat_map(|loads| loads.values()) {
            if !load.slave {
                continue;
            }
            slaves += 1;
            debug!(
                cpu = load.cpu_usage,
                memory = load.allocated_memory,
                "monitor.slave_load"
            );
            if self.thresholds.is_overloaded(load) {
                overloaded += 1;
            }
        }
        self.has_new_data = false;

        if slaves > 0 && overloaded >= slaves / 2 {
            warn!(instance = self.instance, overloaded, slaves, "monitor.adapt");
            self.primary.adapt_algorithm();
            Evaluation::Adapted { overloaded, slaves }
        } else {
            debug!(instance = self.instance, overloaded, slaves, "monitor.stable");
            Evaluation::Stable { overloaded, slaves }
        }
    }

    /// Current round id.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Clusters that reported in the current round.
    pub fn reported_clusters(&self) -> usize {
        self.performance.len()
    }

    /// Whether the current round still awaits evaluation.
    pub fn has_new_data(&self) -> bool {
        self.has_new_data
    }

    /// Loads gathered for the current round.
    pub fn performance(&self) -> &PerformanceMap {
        &self.performance
    }
}
