//! Configuration loader with layered sources.

use crate::{format_validation_errors, AppConfig, ConfigValidator, Environment};
use config::{Config, ConfigError, File};
use hydra_core::{HydraError, HydraResult};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Variable naming the runtime environment.
pub const ENVIRONMENT_VAR: &str = "HYDRA_ENVIRONMENT";

/// Prefix for variables overriding individual settings (`HYDRA__CACHE__INDEX_MARGIN`).
pub const ENV_PREFIX: &str = "HYDRA";

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
    environment: Environment,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// The environment is read from `HYDRA_ENVIRONMENT` (default
    /// `development`). Configuration is then layered in order:
    /// 1. Built-in defaults for that environment
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml`
    /// 4. `config/local.toml` (not committed)
    /// 5. Environment variables with `HYDRA__` prefix
    pub fn new(config_dir: impl Into<String>) -> HydraResult<Self> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment = match std::env::var(ENVIRONMENT_VAR) {
            Ok(value) => value.parse().map_err(HydraError::Configuration)?,
            Err(_) => Environment::default(),
        };

        Self::with_environment(config_dir, environment)
    }

    /// Creates a loader for an explicit environment, ignoring `HYDRA_ENVIRONMENT`.
    pub fn with_environment(
        config_dir: impl Into<String>,
        environment: Environment,
    ) -> HydraResult<Self> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir, environment)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
            environment,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> HydraResult<Self> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> HydraResult<()> {
        let new_config = Self::load_config(&self.config_dir, self.environment)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str, environment: Environment) -> HydraResult<AppConfig> {
        info!(environment = %environment, "Loading configuration");

        let defaults = Config::try_from(&AppConfig::for_environment(environment))
            .map_err(config_error_to_hydra_error)?;

        let mut builder = Config::builder().add_source(defaults);

        // 1. Shared file
        let default_path = format!("{}/default.toml", config_dir);
        if Path::new(&default_path).exists() {
            debug!("Loading default config from: {}", default_path);
            builder = builder.add_source(File::with_name(&default_path).required(false));
        }

        // 2. Environment-specific overrides
        let env_path = format!("{}/{}.toml", config_dir, environment);
        if Path::new(&env_path).exists() {
            debug!("Loading environment config from: {}", env_path);
            builder = builder.add_source(File::with_name(&env_path).required(false));
        }

        // 3. Local overrides (not committed to version control)
        let local_path = format!("{}/local.toml", config_dir);
        if Path::new(&local_path).exists() {
            debug!("Loading local config from: {}", local_path);
            builder = builder.add_source(File::with_name(&local_path).required(false));
        }

        // 4. Environment variables (HYDRA__ prefix)
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_hydra_error)?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_hydra_error)?;

        // The selected environment wins over whatever a file claims.
        app_config.app.environment = environment;

        ConfigValidator::validate(&app_config)
            .map_err(|errors| HydraError::Configuration(format_validation_errors(&errors)))?;

        Ok(app_config)
    }

    /// Gets a specific configuration value by key path.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }
}

fn config_error_to_hydra_error(err: ConfigError) -> HydraError {
    HydraError::Configuration(err.to_string())
}
