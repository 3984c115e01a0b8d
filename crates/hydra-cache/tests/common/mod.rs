//! Common test infrastructure for cache integration tests.

#![allow(dead_code)]

use hydra_cache::{CacheStore, KvBackend, MemoryBackend, RedisBackend};
use hydra_config::RedisConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates a store over a fresh in-memory backend.
pub fn memory_store(entity_type: &str, default_ttl: Duration) -> CacheStore {
    CacheStore::new(Arc::new(MemoryBackend::new()), entity_type, default_ttl)
}

/// Returns a key prefix unique to this process and call.
///
/// Redis tests share one server, so every test writes under its own prefix.
pub fn unique_prefix(name: &str) -> String {
    let n = KEY_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("hydra-test:{}:{}:{}", std::process::id(), n, name)
}

/// Connects to the Redis named by `REDIS_URL`, or `None` when unreachable.
pub async fn redis_backend() -> Option<Arc<dyn KvBackend>> {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let config = RedisConfig {
        url,
        pool_size: 4,
        enabled: true,
    };

    match RedisBackend::connect(&config).await {
        Ok(backend) => Some(Arc::new(backend)),
        Err(_) => None,
    }
}
