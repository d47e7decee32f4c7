//! Periodic pool statistics logging
//!
//! Logs a status-bucket summary of the pool on a fixed interval so operators
//! can watch rotation health without polling the snapshot endpoint. This is
//! host-facing observability only; ban expiry stays lazy and is never driven
//! by this task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, instrument};

use crate::pool::ProxyPool;

/// Stats logging configuration
#[derive(Clone)]
pub struct LogStatsConfig {
    /// Interval between stats log lines
    pub interval: Duration,
}

impl Default for LogStatsConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Periodic stats logger for a proxy pool
pub struct LogStatsService {
    pool: Arc<ProxyPool>,
    config: LogStatsConfig,
}

impl LogStatsService {
    pub fn new(pool: Arc<ProxyPool>, config: LogStatsConfig) -> Self {
        Self { pool, config }
    }

    /// Run the stats logger (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting pool stats logger with {}s interval",
            self.config.interval.as_secs()
        );

        let mut tick = interval(self.config.interval);
        tick.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.log_stats();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Pool stats logger shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn log_stats(&self) {
        let stats = self.pool.stats(Utc::now());
        info!(
            total = stats.total,
            unchecked = stats.unchecked,
            alive = stats.alive,
            banned = stats.banned,
            dead = stats.dead,
            eligible = stats.eligible,
            mean_backoff_secs = format!("{:.1}", stats.mean_backoff_secs).as_str(),
            "proxy pool stats"
        );
    }
}

/// Handle for managing the stats logger lifecycle
pub struct LogStatsHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl LogStatsHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for LogStatsHandle {
    fn default() -> Self {
        Self::new().0
    }
}
