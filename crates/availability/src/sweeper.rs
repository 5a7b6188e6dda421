//! Background purge of expired lock rows.
//!
//! Correctness never depends on this task: expiry is evaluated at acquire
//! time. The sweeper only keeps the lock table small.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::store::LockManager;

/// Configuration for [`LockSweeper`].
#[derive(Debug, Clone)]
pub struct LockSweeperConfig {
    /// Interval between sweeps.
    pub interval: Duration,
    /// Whether the sweeper runs at all.
    pub enabled: bool,
}

impl Default for LockSweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            enabled: true,
        }
    }
}

/// Periodically deletes expired lock rows.
pub struct LockSweeper {
    config: LockSweeperConfig,
    locks: Arc<dyn LockManager>,
}

impl LockSweeper {
    pub fn new(config: LockSweeperConfig, locks: Arc<dyn LockManager>) -> Self {
        Self { config, locks }
    }

    /// Runs one sweep and returns the number of purged rows.
    pub async fn sweep_once(&self) -> crate::Result<u64> {
        let purged = self.locks.purge_expired().await?;
        metrics::counter!("slot_locks_purged_total").increment(purged);
        if purged > 0 {
            info!(purged, "purged expired slot locks");
        } else {
            debug!("no expired slot locks");
        }
        Ok(purged)
    }

    /// Sweeps every `interval` until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("lock sweeper disabled");
            return;
        }
        info!(interval = ?self.config.interval, "lock sweeper started");

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "lock sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("lock sweeper stopped");
    }
}
