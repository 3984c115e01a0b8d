//! Unified error types for the cache engine.

use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for Hydra.
///
/// Variants are split between infrastructure failures, which the cache layer
/// converts into misses, and domain failures, which always reach the caller.
#[derive(Error, Debug)]
pub enum HydraError {
    // ============ Infrastructure Errors ============
    /// The key/value backend could not be reached or rejected the command.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation exceeded its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Domain Errors ============
    /// Caller supplied incomplete or inconsistent input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The source-of-record failed while loading or saving.
    #[error("Source of record error: {0}")]
    Source(String),

    /// A derived index could not be maintained after a save.
    #[error("Derived index maintenance failed for {key}: {message}")]
    DerivedIndex { key: String, message: String },

    // ============ Setup Errors ============
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HydraError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Source(_) => "SOURCE_ERROR",
            Self::DerivedIndex { .. } => "DERIVED_INDEX_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a store error.
    #[must_use]
    pub fn store<T: Into<String>>(message: T) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Creates a source-of-record error.
    #[must_use]
    pub fn source<T: Into<String>>(message: T) -> Self {
        Self::Source(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if this error comes from the cache infrastructure.
    ///
    /// Infrastructure errors are the ones the fail-open boundary absorbs.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::Serialization(_) | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for HydraError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for HydraError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for HydraError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::StoreUnavailable(format!("Failed to get Redis connection: {}", err))
    }
}
