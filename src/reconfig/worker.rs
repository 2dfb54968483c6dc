use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::load::ClusterLoads;
use super::monitor::{Evaluation, Primary, ReconfigurationMonitor};
use crate::types::{ClusterId, GraphError, Result};

enum MonitorMessage {
    Report {
        cluster: ClusterId,
        loads: ClusterLoads,
        instance: u64,
    },
    Evaluate,
    Shutdown,
}

/// Runs a [`ReconfigurationMonitor`] on its own thread.
///
/// The thread owns the monitor outright. Reports arrive over a channel and
/// the monitor is evaluated once per interval, however busy the channel is.
pub struct MonitorWorker;

impl MonitorWorker {
    /// Moves `monitor` onto a new thread that evaluates it every `interval`.
    pub fn spawn<P: Primary + 'static>(
        monitor: ReconfigurationMonitor<P>,
        interval: Duration,
    ) -> Result<MonitorHandle> {
        let (sender, receiver) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("reconfig-monitor".into())
            .spawn(move || monitor_loop(monitor, receiver, interval))?;
        Ok(MonitorHandle {
            sender,
            thread: Some(thread),
        })
    }
}

fn monitor_loop<P: Primary>(
    mut monitor: ReconfigurationMonitor<P>,
    receiver: Receiver<MonitorMessage>,
    interval: Duration,
) {
    let mut next_tick = Instant::now() + interval;
    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(wait) {
            Ok(MonitorMessage::Report {
                cluster,
                loads,
                instance,
            }) => {
                monitor.add_report(cluster, loads, instance);
            }
            Ok(MonitorMessage::Evaluate) => evaluate(&mut monitor),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Ok(MonitorMessage::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                break;
            }
        }
        let now = Instant::now();
        if now >= next_tick {
            evaluate(&mut monitor);
            next_tick += interval;
            if next_tick <= now {
                next_tick = now + interval;
            }
        }
    }
    debug!(instance = monitor.instance(), "monitor.worker.stopped");
}

fn evaluate<P: Primary>(monitor: &mut ReconfigurationMonitor<P>) {
    if let Evaluation::Adapted { overloaded, slaves } = monitor.evaluate() {
        debug!(overloaded, slaves, "monitor.worker.adapted");
    }
}

/// Handle to a running [`MonitorWorker`].
///
/// Dropping the handle stops the worker and waits for it.
pub struct MonitorHandle {
    sender: Sender<MonitorMessage>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Forwards a cluster's load report for round `instance`.
    pub fn report(&self, cluster: ClusterId, loads: ClusterLoads, instance: u64) -> Result<()> {
        self.send(MonitorMessage::Report {
            cluster,
            loads,
            instance,
        })
    }

    /// Asks the worker to evaluate without waiting for the interval.
    pub fn evaluate_now(&self) -> Result<()> {
        self.send(MonitorMessage::Evaluate)
    }

    /// Stops the worker and waits for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, message: MonitorMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| GraphError::WorkerStopped("reconfiguration monitor"))
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.sender.send(MonitorMessage::Shutdown);
        if thread.join().is_err() {
            warn!("monitor.worker.panicked");
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
