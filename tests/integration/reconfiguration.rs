#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bftgraph::db::{Config, MonitorConfig};
use bftgraph::reconfig::{
    ClusterLoads, Evaluation, LoadDescriptor, MonitorWorker, Primary, ReconfigurationMonitor,
};
use bftgraph::types::{ClusterId, ReplicaId, Result};

#[derive(Default)]
struct CountingPrimary {
    adaptations: AtomicUsize,
}

impl CountingPrimary {
    fn count(&self) -> usize {
        self.adaptations.load(Ordering::SeqCst)
    }
}

impl Primary for CountingPrimary {
    fn adapt_algorithm(&self) {
        self.adaptations.fetch_add(1, Ordering::SeqCst);
    }
}

fn cluster(loads: &[LoadDescriptor]) -> ClusterLoads {
    loads
        .iter()
        .enumerate()
        .map(|(i, load)| (ReplicaId(i as u32), *load))
        .collect()
}

fn overloaded_pair() -> ClusterLoads {
    cluster(&[
        LoadDescriptor::slave(0.95, 1_900_000_000),
        LoadDescriptor::slave(0.6, 2_100_000_000),
    ])
}

fn five_clusters() -> MonitorConfig {
    MonitorConfig {
        cluster_count: 5,
        ..MonitorConfig::default()
    }
}

#[test]
fn majority_of_overloaded_slaves_adapts_once_per_round() {
    let primary = Arc::new(CountingPrimary::default());
    let mut monitor = ReconfigurationMonitor::new(Arc::clone(&primary), &five_clusters());

    for id in 1..=3 {
        monitor.add_report(ClusterId(id), overloaded_pair(), 1);
    }
    assert_eq!(
        monitor.evaluate(),
        Evaluation::Adapted {
            overloaded: 6,
            slaves: 6
        }
    );
    assert_eq!(primary.count(), 1);

    assert_eq!(monitor.evaluate(), Evaluation::Skipped);
    monitor.add_report(ClusterId(4), overloaded_pair(), 1);
    assert_eq!(monitor.evaluate(), Evaluation::Skipped);
    assert_eq!(primary.count(), 1);
}

#[test]
fn new_round_discards_previous_reports() {
    let primary = Arc::new(CountingPrimary::default());
    let mut monitor = ReconfigurationMonitor::new(Arc::clone(&primary), &five_clusters());

    for id in 1..=3 {
        monitor.add_report(ClusterId(id), overloaded_pair(), 1);
    }
    assert!(matches!(monitor.evaluate(), Evaluation::Adapted { .. }));

    monitor.add_report(ClusterId(1), overloaded_pair(), 2);
    assert_eq!(monitor.instance(), 2);
    assert_eq!(monitor.reported_clusters(), 1);
    assert!(monitor.has_new_data());
    assert_eq!(monitor.evaluate(), Evaluation::Skipped);

    let calm = cluster(&[
        LoadDescriptor::slave(0.2, 500_000_000),
        LoadDescriptor::slave(0.3, 500_000_000),
    ]);
    monitor.add_report(ClusterId(2), calm.clone(), 2);
    monitor.add_report(ClusterId(3), calm, 2);
    assert_eq!(
        monitor.evaluate(),
        Evaluation::Stable {
            overloaded: 2,
            slaves: 6
        }
    );
    assert_eq!(primary.count(), 1);
}

#[test]
fn half_rounded_down_is_enough() {
    let primary = Arc::new(CountingPrimary::default());
    let config = MonitorConfig {
        cluster_count: 1,
        ..MonitorConfig::default()
    };
    let mut monitor = ReconfigurationMonitor::new(Arc::clone(&primary), &config);
    let idle = LoadDescriptor::slave(0.1, 100);
    let hot = LoadDescriptor::slave(0.99, 1_900_000_000);
    monitor.add_report(ClusterId(0), cluster(&[hot, idle, idle]), 1);
    assert_eq!(
        monitor.evaluate(),
        Evaluation::Adapted {
            overloaded: 1,
            slaves: 3
        }
    );
}

#[test]
fn thresholds_come_from_config() -> Result<()> {
    let config = Config::from_toml_str(
        "[monitor]\ncluster_count = 1\nborder_cpu_usage = 0.5\nmemory_high_watermark = 1000\n",
    )?;
    let primary = Arc::new(CountingPrimary::default());
    let mut monitor = ReconfigurationMonitor::new(Arc::clone(&primary), &config.monitor);
    monitor.add_report(ClusterId(0), cluster(&[LoadDescriptor::slave(0.6, 2000)]), 1);
    assert!(matches!(monitor.evaluate(), Evaluation::Adapted { .. }));
    Ok(())
}

#[test]
fn worker_ticks_on_interval_under_steady_reports() -> Result<()> {
    let primary = Arc::new(CountingPrimary::default());
    let config = MonitorConfig {
        interval_ms: 100,
        ..five_clusters()
    };
    let monitor = ReconfigurationMonitor::new(Arc::clone(&primary), &config);
    let handle = MonitorWorker::spawn(monitor, config.interval())?;

    let started = Instant::now();
    while started.elapsed() < Duration::from_millis(1_000) {
        for id in 1..=3 {
            handle.report(ClusterId(id), overloaded_pair(), 7)?;
        }
        std::thread::sleep(Duration::from_millis(30));
    }

    assert_eq!(primary.count(), 1);
    handle.shutdown();
    Ok(())
}

#[test]
fn evaluate_now_skips_the_interval() -> Result<()> {
    let primary = Arc::new(CountingPrimary::default());
    let config = MonitorConfig {
        interval_ms: 60_000,
        ..five_clusters()
    };
    let monitor = ReconfigurationMonitor::new(Arc::clone(&primary), &config);
    let handle = MonitorWorker::spawn(monitor, config.interval())?;

    for id in 1..=3 {
        handle.report(ClusterId(id), overloaded_pair(), 7)?;
    }
    handle.evaluate_now()?;

    let deadline = Instant::now() + Duration::from_secs(5);
    while primary.count() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(primary.count(), 1);
    handle.shutdown();
    Ok(())
}
