//! Configuration validation module.
//!
//! Collects every problem in one pass so a bad deployment fails fast with
//! the full list instead of one error per restart.

use crate::AppConfig;
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// The timeline margin must keep indices alive at least twice as long as members.
    IndexMarginTooSmall { value: u32, minimum: u32 },
    /// A TTL is zero.
    ZeroTtl { name: String },
    /// A TTL is longer than any store can represent sensibly.
    TtlTooLarge { name: String, value: u64, maximum: u64 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Pool size configuration is invalid.
    InvalidPoolSize { value: usize, maximum: usize },
    /// Sweep interval is zero while the sweep is enabled.
    ZeroSweepInterval,
    /// A glob pattern is empty.
    EmptyPattern { name: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexMarginTooSmall { value, minimum } => {
                write!(
                    f,
                    "Index margin too small: {} (minimum {})",
                    value, minimum
                )
            }
            Self::ZeroTtl { name } => {
                write!(f, "TTL '{}' must be positive", name)
            }
            Self::TtlTooLarge {
                name,
                value,
                maximum,
            } => {
                write!(f, "TTL '{}' too large: {}s (maximum {}s)", name, value, maximum)
            }
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::InvalidPoolSize { value, maximum } => {
                write!(f, "Invalid pool size: {} (must be 1-{})", value, maximum)
            }
            Self::ZeroSweepInterval => {
                write!(f, "Sweep interval must be positive when the sweep is enabled")
            }
            Self::EmptyPattern { name } => {
                write!(f, "Pattern '{}' must not be empty", name)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of configuration validation containing all errors found.
#[derive(Debug)]
struct ValidationResult {
    errors: Vec<ConfigValidationError>,
}

impl ValidationResult {
    fn new() -> Self {
        Self { errors: Vec::new() }
    }

    fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    fn into_result(self) -> Result<(), Vec<ConfigValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Smallest allowed timeline margin.
    pub const MIN_INDEX_MARGIN: u32 = 2;
    /// Longest allowed TTL, ten years.
    pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;
    /// Maximum connection pool size.
    const MAX_POOL_SIZE: usize = 1000;

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut result = ValidationResult::new();

        Self::validate_redis(&config.redis, &mut result);
        Self::validate_cache(&config.cache, &mut result);
        Self::validate_maintenance(&config.maintenance, &mut result);

        result.into_result()
    }

    fn validate_redis(config: &crate::RedisConfig, result: &mut ValidationResult) {
        if !config.enabled {
            return;
        }

        if config.url.trim().is_empty() {
            result.add_error(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL is required when Redis is enabled".to_string(),
            });
        } else if !config.url.starts_with("redis://") && !config.url.starts_with("rediss://") {
            result.add_error(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL must start with redis:// or rediss://".to_string(),
            });
        }

        if config.pool_size == 0 || config.pool_size > Self::MAX_POOL_SIZE {
            result.add_error(ConfigValidationError::InvalidPoolSize {
                value: config.pool_size,
                maximum: Self::MAX_POOL_SIZE,
            });
        }
    }

    fn validate_cache(config: &crate::CacheConfig, result: &mut ValidationResult) {
        if config.index_margin < Self::MIN_INDEX_MARGIN {
            result.add_error(ConfigValidationError::IndexMarginTooSmall {
                value: config.index_margin,
                minimum: Self::MIN_INDEX_MARGIN,
            });
        }

        Self::check_ttl("cache.fallback_ttl_secs", config.fallback_ttl_secs, result);

        let mut entities: Vec<(&String, &u64)> = config.entity_ttls.iter().collect();
        entities.sort();
        for (entity, ttl) in entities {
            Self::check_ttl(&format!("cache.entity_ttls.{}", entity), *ttl, result);
        }
    }

    fn check_ttl(name: &str, value: u64, result: &mut ValidationResult) {
        if value == 0 {
            result.add_error(ConfigValidationError::ZeroTtl {
                name: name.to_string(),
            });
        } else if value > Self::MAX_TTL_SECS {
            result.add_error(ConfigValidationError::TtlTooLarge {
                name: name.to_string(),
                value,
                maximum: Self::MAX_TTL_SECS,
            });
        }
    }

    fn validate_maintenance(config: &crate::MaintenanceConfig, result: &mut ValidationResult) {
        if !config.sweep_enabled {
            return;
        }

        if config.sweep_interval_secs == 0 {
            result.add_error(ConfigValidationError::ZeroSweepInterval);
        }

        if config.timeline_pattern.trim().is_empty() {
            result.add_error(ConfigValidationError::EmptyPattern {
                name: "maintenance.timeline_pattern".to_string(),
            });
        }
    }
}

/// Formats validation errors for display.
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    let mut output = String::from("Configuration validation failed:\n");
    for (i, error) in errors.iter().enumerate() {
        output.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    output
}
