//! Application configuration structures.

use crate::Environment;
use hydra_core::telemetry::TelemetryConfig;
use hydra_core::{HydraError, HydraResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// One day, the lifetime of volatile entities.
pub const DAY_SECS: u64 = 86_400;

/// Thirty days, the lifetime of append-mostly entities.
pub const THIRTY_DAYS_SECS: u64 = 30 * DAY_SECS;

/// Entities whose cached copy goes stale within a day.
const VOLATILE_ENTITIES: &[&str] = &["uploads", "user", "accounts"];

/// Entities that are mostly appended to and rarely rewritten.
const APPEND_MOSTLY_ENTITIES: &[&str] = &["ads", "orders", "visits", "clients", "claims"];

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Cache TTLs and behavior switches.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Background maintenance.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: TelemetryConfig,
}

impl AppConfig {
    /// Builds the defaults for a given environment.
    ///
    /// The loader layers files and environment variables on top of this.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            app: AppMetadata {
                environment,
                ..AppMetadata::default()
            },
            redis: RedisConfig::default(),
            cache: CacheConfig::for_environment(environment),
            maintenance: MaintenanceConfig::for_environment(environment),
            observability: TelemetryConfig::default(),
        }
    }

    /// Renders the effective configuration as TOML.
    pub fn to_toml(&self) -> HydraResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| HydraError::Configuration(format!("Failed to render config: {}", e)))
    }
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (production, development, testing).
    pub environment: Environment,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "hydra".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::default(),
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// Enable Redis (the in-memory backend is used when disabled).
    pub enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            enabled: true,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL in seconds keyed by entity type.
    #[serde(default)]
    pub entity_ttls: HashMap<String, u64>,

    /// TTL in seconds for entity types missing from `entity_ttls`.
    pub fallback_ttl_secs: u64,

    /// Timeline TTL is kept at least this multiple of its members' TTL.
    pub index_margin: u32,

    /// Per-operation deadline in milliseconds; `0` disables it.
    #[serde(default)]
    pub operation_timeout_ms: u64,

    /// Collapse concurrent cold misses on one key into a single source load.
    #[serde(default)]
    pub coalesce_misses: bool,
}

impl CacheConfig {
    /// Builds the TTL table for an environment.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        let mut entity_ttls = HashMap::new();
        for entity in VOLATILE_ENTITIES {
            entity_ttls.insert((*entity).to_string(), DAY_SECS);
        }
        for entity in APPEND_MOSTLY_ENTITIES {
            entity_ttls.insert((*entity).to_string(), THIRTY_DAYS_SECS);
        }

        let fallback_ttl_secs = if environment.is_testing() { 10 } else { 300 };

        Self {
            entity_ttls,
            fallback_ttl_secs,
            index_margin: 2,
            operation_timeout_ms: 0,
            coalesce_misses: false,
        }
    }

    /// Returns the TTL for an entity type, falling back to the default.
    #[must_use]
    pub fn ttl_for(&self, entity_type: &str) -> Duration {
        let secs = self
            .entity_ttls
            .get(entity_type)
            .copied()
            .unwrap_or(self.fallback_ttl_secs);
        Duration::from_secs(secs)
    }

    /// Returns the fallback TTL.
    #[must_use]
    pub fn fallback_ttl(&self) -> Duration {
        Duration::from_secs(self.fallback_ttl_secs)
    }

    /// Returns the per-operation deadline, if any.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

/// Background maintenance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Run the periodic timeline sweep.
    pub sweep_enabled: bool,
    /// Seconds between sweeps.
    pub sweep_interval_secs: u64,
    /// Glob selecting the timelines to sweep.
    pub timeline_pattern: String,
    /// Remove keys from the old `timeline:*` layout at startup.
    pub cleanup_legacy_on_start: bool,
}

impl MaintenanceConfig {
    /// Builds the maintenance defaults for an environment.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        let sweep_interval_secs = match environment {
            Environment::Production => 6 * 3600,
            Environment::Development => 3600,
            Environment::Testing => 60,
        };

        Self {
            sweep_enabled: true,
            sweep_interval_secs,
            timeline_pattern: "user:*:timeline".to_string(),
            cleanup_legacy_on_start: true,
        }
    }

    /// Returns the sweep interval as a Duration.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_table() {
        let config = CacheConfig::for_environment(Environment::Production);
        assert_eq!(config.ttl_for("orders"), Duration::from_secs(THIRTY_DAYS_SECS));
        assert_eq!(config.ttl_for("accounts"), Duration::from_secs(DAY_SECS));
        assert_eq!(config.ttl_for("unknown"), Duration::from_secs(300));
        assert_eq!(config.index_margin, 2);
        assert!(config.operation_timeout().is_none());
    }

    #[test]
    fn test_testing_fallback_is_short() {
        let config = CacheConfig::for_environment(Environment::Testing);
        assert_eq!(config.fallback_ttl(), Duration::from_secs(10));
        assert_eq!(config.ttl_for("visits"), Duration::from_secs(THIRTY_DAYS_SECS));
    }

    #[test]
    fn test_sweep_intervals() {
        assert_eq!(
            MaintenanceConfig::for_environment(Environment::Production).sweep_interval(),
            Duration::from_secs(21_600)
        );
        assert_eq!(
            MaintenanceConfig::for_environment(Environment::Testing).sweep_interval_secs,
            60
        );
    }

    #[test]
    fn test_operation_timeout() {
        let config = CacheConfig {
            operation_timeout_ms: 250,
            ..CacheConfig::default()
        };
        assert_eq!(config.operation_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_cache_section_from_toml() {
        let config: CacheConfig = toml::from_str(
            r#"
            fallback_ttl_secs = 60
            index_margin = 3
            operation_timeout_ms = 0
            coalesce_misses = true

            [entity_ttls]
            orders = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.ttl_for("orders"), Duration::from_secs(120));
        assert_eq!(config.ttl_for("ads"), Duration::from_secs(60));
        assert!(config.coalesce_misses);
    }

    #[test]
    fn test_to_toml_renders_sections() {
        let rendered = AppConfig::for_environment(Environment::Production)
            .to_toml()
            .unwrap();
        assert!(rendered.contains("[cache.entity_ttls]"));
        assert!(rendered.contains("sweep_interval_secs = 21600"));
    }

    #[test]
    fn test_app_config_for_environment() {
        let config = AppConfig::for_environment(Environment::Testing);
        assert_eq!(config.app.environment, Environment::Testing);
        assert_eq!(config.cache.fallback_ttl_secs, 10);
        assert_eq!(config.maintenance.sweep_interval_secs, 60);
    }
}
