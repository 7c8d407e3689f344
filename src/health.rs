//! Health Monitor
//!
//! Background task probing both backends on a fixed interval so that the
//! facade can route on health flags without probing on every call.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::connection::{BackendConnection, BackendHealth};

/// Snapshot returned by `get_health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub local: BackendHealth,
    pub cloud: BackendHealth,
    /// At least one backend is currently healthy
    pub any_available: bool,
}

impl HealthReport {
    #[must_use]
    pub fn from_connections(local: &BackendConnection, cloud: &BackendConnection) -> Self {
        let local = local.health();
        let cloud = cloud.health();
        Self {
            local,
            cloud,
            any_available: local.healthy || cloud.healthy,
        }
    }
}

/// Periodic prober for the local and cloud connections
pub struct HealthMonitor {
    local: Arc<BackendConnection>,
    cloud: Arc<BackendConnection>,
    interval: Duration,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    ticks: Arc<AtomicU64>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(
        local: Arc<BackendConnection>,
        cloud: Arc<BackendConnection>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            local,
            cloud,
            interval,
            shutdown_tx,
            task: Mutex::new(None),
            stopped: AtomicBool::new(false),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Probe both backends once, concurrently
    ///
    /// Each probe is bounded by its own timeout, so a hanging backend never
    /// delays the other one's health update.
    pub async fn tick(local: &BackendConnection, cloud: &BackendConnection) -> HealthReport {
        tokio::join!(local.probe(), cloud.probe());
        HealthReport::from_connections(local, cloud)
    }

    /// Spawn the background task
    ///
    /// Returns `false` if it is already running or the monitor was stopped.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if task.is_some() || self.stopped.load(Ordering::SeqCst) {
            return false;
        }

        let local = Arc::clone(&self.local);
        let cloud = Arc::clone(&self.cloud);
        let period = self.interval;
        let ticks = Arc::clone(&self.ticks);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *task = Some(tokio::spawn(async move {
            // First tick one period from now: connect() has just set the flags
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = Self::tick(&local, &cloud).await;
                        ticks.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            local_healthy = report.local.healthy,
                            cloud_healthy = report.cloud.healthy,
                            "Health check tick"
                        );
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Health monitor shutting down...");
                        break;
                    }
                }
            }
        }));

        info!(interval_ms = period.as_millis(), "Health monitor started");
        true
    }

    /// Stop the background task and wait for it to finish. No-op when
    /// already stopped or never started.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };
        let _ = self.shutdown_tx.send(());
        if let Err(e) = task.await {
            error!(error = %e, "Health monitor task ended abnormally");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Number of completed background ticks
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}
