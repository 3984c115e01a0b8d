//! # Hydra Maintenance Worker
//!
//! Loads configuration, connects to the store, removes legacy timeline keys,
//! and prunes dead timeline references until Ctrl+C.

use hydra_cache::metrics::register_metrics;
use hydra_config::ConfigLoader;
use hydra_core::telemetry::init_telemetry;
use hydra_core::HydraResult;
use hydra_maintenance::{di, run_worker, startup};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {}", e);
        eprintln!("hydra-maintenance: {e}");
        std::process::exit(1);
    }
}

async fn run() -> HydraResult<()> {
    // Load configuration
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    // Initialize logging
    init_telemetry(&config.observability)?;
    register_metrics();

    info!("Starting Hydra maintenance worker...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    startup::print_startup_info(&config);
    match config.to_toml() {
        Ok(rendered) => debug!("Effective configuration:\n{}", rendered),
        Err(e) => warn!("Could not render configuration: {}", e),
    }

    let backend = di::build_backend(&config.redis).await?;
    let report = run_worker(&config, backend, startup::shutdown_signal()).await?;

    info!(
        legacy_removed = report.legacy_removed,
        swept = report.swept,
        "Maintenance worker shutdown complete"
    );
    Ok(())
}
