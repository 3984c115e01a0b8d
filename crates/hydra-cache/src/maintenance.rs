//! Background timeline maintenance.
//!
//! Dead references are normally pruned when a timeline is resolved. The
//! sweeper prunes every timeline on an interval so rarely-read timelines do
//! not accumulate them. It only removes references; it never loads data.

use crate::metrics::TimelineMetrics;
use crate::store::CacheStore;
use crate::timeline::TimelineIndex;
use futures::stream::{self, StreamExt};
use hydra_config::MaintenanceConfig;
use hydra_core::{HydraError, HydraResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Glob matching keys from the retired root-level timeline layout.
pub const LEGACY_TIMELINE_PATTERN: &str = "timeline:*";

/// Timelines pruned concurrently during one sweep.
const SWEEP_CONCURRENCY: usize = 8;

/// Deletes keys left by the retired `timeline:*` layout.
///
/// Safe to run repeatedly; returns how many keys were removed.
pub async fn cleanup_legacy_timelines(store: &CacheStore) -> u64 {
    let removed = store.delete_by_pattern(LEGACY_TIMELINE_PATTERN).await;
    info!(removed, "Legacy timeline cleanup finished");
    removed
}

/// Result of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Timelines visited.
    pub timelines: u64,
    /// References removed.
    pub pruned: u64,
}

/// Periodic pruning of dead timeline references.
pub struct TimelineSweeper {
    index: TimelineIndex,
    pattern: String,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    running: Arc<AtomicBool>,
}

impl TimelineSweeper {
    /// Creates a sweeper over timelines matching `pattern`.
    #[must_use]
    pub fn new(index: TimelineIndex, pattern: impl Into<String>, interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            index,
            pattern: pattern.into(),
            interval,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a sweeper from the maintenance configuration.
    #[must_use]
    pub fn from_config(index: TimelineIndex, config: &MaintenanceConfig) -> Self {
        Self::new(index, config.timeline_pattern.clone(), config.sweep_interval())
    }

    /// Returns true while [`start`](Self::start) is looping.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Prunes every matching timeline once.
    pub async fn sweep_once(&self) -> SweepReport {
        let timelines = self.index.store().keys(&self.pattern).await;
        let visited = timelines.len() as u64;

        let pruned = stream::iter(timelines)
            .map(|timeline| async move { self.index.prune(&timeline).await })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .fold(0u64, |total, pruned| async move { total + pruned })
            .await;

        TimelineMetrics::swept(visited);
        debug!(
            pattern = %self.pattern,
            timelines = visited,
            pruned,
            "Timeline sweep finished"
        );

        SweepReport {
            timelines: visited,
            pruned,
        }
    }

    /// Runs sweeps until [`stop`](Self::stop) is called.
    ///
    /// The first sweep happens immediately.
    pub async fn start(&self) -> HydraResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HydraError::internal("Sweeper already running"));
        }

        info!(
            pattern = %self.pattern,
            interval_secs = self.interval.as_secs(),
            "Starting timeline sweeper"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Timeline sweeper stopped");

        Ok(())
    }

    /// Stop the sweeper.
    pub fn stop(&self) {
        info!("Stopping timeline sweeper...");
        self.shutdown_tx.send_replace(true);
    }
}
