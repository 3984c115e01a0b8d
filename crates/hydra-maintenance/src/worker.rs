//! Maintenance worker.
//!
//! Runs the one-off legacy cleanup, then the timeline sweep until the
//! shutdown future resolves.

use hydra_cache::{cleanup_legacy_timelines, CacheStore, KvBackend, TimelineIndex, TimelineSweeper};
use hydra_config::AppConfig;
use hydra_core::{HealthCheck, HydraResult};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Entity type the worker's store is bound to.
pub const TIMELINE_ENTITY: &str = "timeline";

/// What a worker run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    /// Legacy keys deleted at startup.
    pub legacy_removed: u64,
    /// Whether the sweep ran.
    pub swept: bool,
}

/// Runs maintenance against `backend` until `shutdown` resolves.
pub async fn run_worker<F>(
    config: &AppConfig,
    backend: Arc<dyn KvBackend>,
    shutdown: F,
) -> HydraResult<WorkerReport>
where
    F: Future<Output = ()>,
{
    let store = CacheStore::from_config(backend, TIMELINE_ENTITY, &config.cache);
    let mut report = WorkerReport::default();

    let status = store.check().await;
    if !status.is_healthy() {
        warn!(backend = store.name(), status = ?status, "Store unhealthy at startup");
    }

    if config.maintenance.cleanup_legacy_on_start {
        report.legacy_removed = cleanup_legacy_timelines(&store).await;
    }

    if !config.maintenance.sweep_enabled {
        info!("Timeline sweep disabled, nothing left to do");
        return Ok(report);
    }

    let index = TimelineIndex::new(store).with_margin(config.cache.index_margin);
    let sweeper = TimelineSweeper::from_config(index, &config.maintenance);

    let stop = async {
        shutdown.await;
        sweeper.stop();
    };
    let (result, ()) = tokio::join!(sweeper.start(), stop);
    result?;

    report.swept = true;
    Ok(report)
}
