//! Worker startup utilities.

use hydra_config::AppConfig;
use tokio::signal;
use tracing::{error, info};

/// Lines describing the effective worker setup.
#[must_use]
pub fn startup_summary(config: &AppConfig) -> Vec<String> {
    let redis = if config.redis.enabled {
        config.redis.url.as_str()
    } else {
        "disabled"
    };
    let sweep = if config.maintenance.sweep_enabled {
        format!(
            "{} every {}s",
            config.maintenance.timeline_pattern, config.maintenance.sweep_interval_secs
        )
    } else {
        "disabled".to_string()
    };

    vec![
        format!("Environment:     {}", config.app.environment),
        format!("Redis:           {}", redis),
        format!("Index margin:    {}x", config.cache.index_margin),
        format!("Legacy cleanup:  {}", config.maintenance.cleanup_legacy_on_start),
        format!("Sweep:           {}", sweep),
    ]
}

/// Prints worker startup information.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    info!("{}", separator);
    for line in startup_summary(config) {
        info!("{}", line);
    }
    info!("{}", separator);
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
