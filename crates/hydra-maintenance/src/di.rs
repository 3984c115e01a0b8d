//! Dependency injection module using Shaku.
//!
//! The store backend is the only shared component. Everything above it
//! (stores, indices, sweepers) is cheap to build per use from the resolved
//! backend.

use deadpool_redis::Pool;
use hydra_cache::{create_pool, KvBackend, MemoryBackend, RedisBackend, RedisBackendParameters};
use hydra_config::RedisConfig;
use hydra_core::HydraResult;
use shaku::{module, HasComponent};
use std::sync::Arc;
use tracing::{info, warn};

// Redis-backed deployment module.
module! {
    pub RedisModule {
        components = [
            RedisBackend,
        ],
        providers = [],
    }
}

/// Builds the Redis module around an existing pool.
#[must_use]
pub fn build_redis_module(pool: Pool) -> Arc<RedisModule> {
    let module = RedisModule::builder()
        .with_component_parameters::<RedisBackend>(RedisBackendParameters {
            pool: Some(Arc::new(pool)),
        })
        .build();

    Arc::new(module)
}

/// Resolves the store backend for this configuration.
///
/// Uses Redis when enabled, otherwise a process-local memory backend.
pub async fn build_backend(config: &RedisConfig) -> HydraResult<Arc<dyn KvBackend>> {
    if !config.enabled {
        warn!("Redis disabled, using in-memory backend");
        return Ok(Arc::new(MemoryBackend::new()));
    }

    let pool = create_pool(config).await?;
    let module = build_redis_module(pool);
    let backend: Arc<dyn KvBackend> = module.resolve();
    info!(backend = backend.name(), "Store backend ready");

    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_redis_uses_memory_backend() {
        let config = RedisConfig {
            enabled: false,
            ..RedisConfig::default()
        };
        let backend = build_backend(&config).await.unwrap();
        assert_eq!(backend.name(), "memory");
    }

    #[tokio::test]
    async fn test_module_without_pool_reports_unavailable() {
        let module = RedisModule::builder().build();
        let backend: Arc<dyn KvBackend> = module.resolve();

        assert_eq!(backend.name(), "redis");
        assert!(backend.ping().await.is_err());
        assert!(backend.get("any").await.is_err());
    }
}
