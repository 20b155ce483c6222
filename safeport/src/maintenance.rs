//! Periodic maintenance daemon.
//!
//! Runs in a background task and, every interval:
//! 1. Sweeps expired resource tickets and releases their regions
//! 2. Prunes the performance monitor's rolling history
//!
//! Stops when its cancellation token fires.
//!
//! # Example
//!
//! ```ignore
//! let daemon = MaintenanceDaemon::new(loader, monitor, Duration::from_secs(5));
//! let shutdown = CancellationToken::new();
//! tokio::spawn(daemon.run(shutdown.clone()));
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::loader::RegionLoader;
use crate::monitor::PerformanceMonitor;

/// Background daemon sweeping tickets and pruning metrics history.
pub struct MaintenanceDaemon {
    loader: RegionLoader,
    monitor: Arc<dyn PerformanceMonitor>,
    interval: Duration,
}

impl MaintenanceDaemon {
    /// Creates a daemon ticking every `interval`.
    pub fn new(
        loader: RegionLoader,
        monitor: Arc<dyn PerformanceMonitor>,
        interval: Duration,
    ) -> Self {
        Self {
            loader,
            monitor,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Runs one maintenance pass. Returns the number of tickets swept.
    pub async fn tick(&self) -> usize {
        let swept = self.loader.sweep_expired().await;
        self.monitor.housekeeping();
        if swept > 0 {
            debug!(
                swept,
                active_tickets = self.loader.active_tickets(),
                "Maintenance pass released expired regions"
            );
        }
        swept
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Maintenance daemon starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Maintenance daemon shutting down");
                    break;
                }

                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}
