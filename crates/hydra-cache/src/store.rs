//! Fail-open key/value store.
//!
//! [`CacheStore`] is the boundary where backend errors stop. Every operation
//! returns the miss/false/empty outcome when the backend fails, after a
//! structured log line and a `hydra_cache_fail_open_total` increment.

use crate::backend::KvBackend;
use crate::metrics::CacheMetrics;
use async_trait::async_trait;
use hydra_config::CacheConfig;
use hydra_core::{HealthCheck, HealthStatus, HydraError, HydraResult};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Cache store bound to one entity type.
///
/// Cloning is cheap; clones share the backend.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KvBackend>,
    entity_type: Arc<str>,
    default_ttl: Duration,
    op_timeout: Option<Duration>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.name())
            .field("entity_type", &self.entity_type)
            .field("default_ttl", &self.default_ttl)
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl CacheStore {
    /// Creates a store for `entity_type` with an explicit default TTL.
    #[must_use]
    pub fn new(backend: Arc<dyn KvBackend>, entity_type: &str, default_ttl: Duration) -> Self {
        Self {
            backend,
            entity_type: Arc::from(entity_type),
            default_ttl,
            op_timeout: None,
        }
    }

    /// Creates a store whose default TTL and deadline come from configuration.
    #[must_use]
    pub fn from_config(backend: Arc<dyn KvBackend>, entity_type: &str, config: &CacheConfig) -> Self {
        let mut store = Self::new(backend, entity_type, config.ttl_for(entity_type));
        store.op_timeout = config.operation_timeout();
        store
    }

    /// Returns a copy that bounds every backend call by `timeout`.
    ///
    /// A call that overruns is treated like any other backend failure.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = Some(timeout);
        self
    }

    /// Entity type this store was built for.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// TTL applied when a write passes none.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// The shared backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    fn ttl_or_default(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.default_ttl)
    }

    /// Runs a backend call under the configured deadline.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> HydraResult<T>
    where
        F: Future<Output = HydraResult<T>>,
    {
        match self.op_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(HydraError::Timeout(format!(
                    "{} exceeded {}ms",
                    operation,
                    limit.as_millis()
                ))),
            },
            None => call.await,
        }
    }

    /// Logs and counts a failure swallowed at the fail-open boundary.
    fn absorb(&self, operation: &'static str, key: &str, e: &HydraError) {
        if e.is_infrastructure() {
            warn!(
                operation,
                key,
                backend = self.backend.name(),
                error = %e,
                "Cache operation failed, continuing without cache"
            );
        } else {
            error!(
                operation,
                key,
                backend = self.backend.name(),
                error = %e,
                "Unexpected cache failure, continuing without cache"
            );
        }
        CacheMetrics::fail_open(operation, e.error_code());
    }

    /// Runs a backend call under the deadline and absorbs its failure.
    async fn fail_open<T, F>(&self, operation: &'static str, key: &str, call: F, fallback: T) -> T
    where
        F: Future<Output = HydraResult<T>>,
    {
        match self.bounded(operation, call).await {
            Ok(value) => value,
            Err(e) => {
                self.absorb(operation, key, &e);
                fallback
            }
        }
    }

    fn decode(&self, key: &str, raw: &str) -> Option<Value> {
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Malformed cached payload, treating as miss");
                CacheMetrics::fail_open("decode", HydraError::from(e).error_code());
                None
            }
        }
    }

    /// Reads a value. Missing, expired, malformed, and unreachable all read as `None`.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let raw = self.fail_open("get", key, self.backend.get(key), None).await;

        match raw.and_then(|raw| self.decode(key, &raw)) {
            Some(value) => {
                debug!("Cache hit for key '{}'", key);
                CacheMetrics::hit(&self.entity_type);
                Some(value)
            }
            None => {
                debug!("Cache miss for key '{}'", key);
                CacheMetrics::miss(&self.entity_type);
                None
            }
        }
    }

    /// Writes a value with `ttl`, or the entity default when `None`.
    pub async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool {
        let ttl = self.ttl_or_default(ttl);
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache payload");
                return false;
            }
        };

        let stored = self
            .fail_open(
                "set",
                key,
                async { self.backend.set_ex(key, &payload, ttl).await.map(|()| true) },
                false,
            )
            .await;

        if stored {
            debug!("Cached key '{}' with TTL {}s", key, ttl.as_secs());
        }
        stored
    }

    /// Deletes a key. Returns true only if it existed.
    pub async fn delete(&self, key: &str) -> bool {
        let keys = [key.to_string()];
        self.fail_open("delete", key, self.backend.del(&keys), 0).await > 0
    }

    /// Returns true if the key is live.
    pub async fn exists(&self, key: &str) -> bool {
        self.fail_open("exists", key, self.backend.exists(key), false).await
    }

    /// Resets the expiry of an existing key. False when the key is gone.
    pub async fn extend_ttl(&self, key: &str, ttl: Option<Duration>) -> bool {
        let ttl = self.ttl_or_default(ttl);
        self.fail_open("extend_ttl", key, self.backend.expire(key, ttl), false)
            .await
    }

    /// Remaining lifetime of a key; `None` when missing or persistent.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        self.fail_open("ttl", key, self.backend.ttl(key), None).await
    }

    /// Reads many keys in one round trip.
    ///
    /// The result has exactly the input keys; failures and misses map to `None`.
    pub async fn get_many(&self, keys: &[String]) -> HashMap<String, Option<Value>> {
        if keys.is_empty() {
            return HashMap::new();
        }

        match self.try_get_many(keys).await {
            Ok(values) => values,
            Err(e) => {
                self.absorb("get_many", "<batch>", &e);
                keys.iter().map(|key| (key.clone(), None)).collect()
            }
        }
    }

    /// Batch read that reports a backend failure instead of absorbing it.
    ///
    /// Callers that act on absence (pruning) must tell "gone" from "unknown".
    pub(crate) async fn try_get_many(
        &self,
        keys: &[String],
    ) -> HydraResult<HashMap<String, Option<Value>>> {
        let raw = self.bounded("get_many", self.backend.mget(keys)).await?;

        let mut values = HashMap::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let value = raw
                .get(i)
                .cloned()
                .flatten()
                .and_then(|raw| self.decode(key, &raw));
            values.insert(key.clone(), value);
        }

        let hits = values.values().filter(|v| v.is_some()).count();
        debug!(requested = keys.len(), hits, "Batch cache read");
        Ok(values)
    }

    /// Writes many values with one TTL in one round trip.
    pub async fn set_many(&self, items: &HashMap<String, Value>, ttl: Option<Duration>) -> bool {
        if items.is_empty() {
            return true;
        }

        let ttl = self.ttl_or_default(ttl);
        let mut encoded = Vec::with_capacity(items.len());
        for (key, value) in items {
            match serde_json::to_string(value) {
                Ok(payload) => encoded.push((key.clone(), payload)),
                Err(e) => {
                    warn!(key, error = %e, "Failed to encode cache payload");
                    return false;
                }
            }
        }

        self.fail_open(
            "set_many",
            "<batch>",
            async { self.backend.mset_ex(&encoded, ttl).await.map(|()| true) },
            false,
        )
        .await
    }

    /// Resets the expiry of many keys; returns how many existed.
    pub async fn extend_many_ttl(&self, keys: &[String], ttl: Option<Duration>) -> u64 {
        if keys.is_empty() {
            return 0;
        }
        let ttl = self.ttl_or_default(ttl);
        self.fail_open("extend_many_ttl", "<batch>", self.backend.mexpire(keys, ttl), 0)
            .await
    }

    /// Deletes many keys; returns how many existed.
    pub async fn delete_many(&self, keys: &[String]) -> u64 {
        if keys.is_empty() {
            return 0;
        }
        self.fail_open("delete_many", "<batch>", self.backend.del(keys), 0)
            .await
    }

    /// Reads every string key matching `pattern`. Unreadable entries are skipped.
    pub async fn get_by_pattern(&self, pattern: &str) -> HashMap<String, Value> {
        let keys = self
            .fail_open("get_by_pattern", pattern, self.backend.keys(pattern), Vec::new())
            .await;

        self.get_many(&keys)
            .await
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect()
    }

    /// Deletes every key matching `pattern`; returns how many were removed.
    pub async fn delete_by_pattern(&self, pattern: &str) -> u64 {
        let keys = self
            .fail_open("delete_by_pattern", pattern, self.backend.keys(pattern), Vec::new())
            .await;

        let deleted = self.delete_many(&keys).await;
        if deleted > 0 {
            debug!("Deleted {} keys matching pattern '{}'", deleted, pattern);
        }
        deleted
    }

    /// Lists keys matching `pattern`.
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        self.fail_open("keys", pattern, self.backend.keys(pattern), Vec::new())
            .await
    }

    /// Adds members to a set key; returns how many were new.
    pub async fn add_members(&self, key: &str, members: &[String]) -> u64 {
        self.fail_open("sadd", key, self.backend.sadd(key, members), 0)
            .await
    }

    /// Removes members from a set key; returns how many were present.
    pub async fn remove_members(&self, key: &str, members: &[String]) -> u64 {
        self.fail_open("srem", key, self.backend.srem(key, members), 0)
            .await
    }

    /// Members of a set key, empty when missing or unreachable.
    pub async fn members(&self, key: &str) -> HashSet<String> {
        self.fail_open("smembers", key, self.backend.smembers(key), HashSet::new())
            .await
    }

    /// Pings the backend, surfacing the error instead of absorbing it.
    pub async fn health_check(&self) -> HydraResult<()> {
        match self.op_timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.ping())
                .await
                .map_err(|_| HydraError::Timeout("ping".to_string()))?,
            None => self.backend.ping().await,
        }
    }
}

#[async_trait]
impl HealthCheck for CacheStore {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn check(&self) -> HealthStatus {
        match self.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn store() -> CacheStore {
        CacheStore::new(Arc::new(MemoryBackend::new()), "orders", Duration::from_secs(60))
    }

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = store();
        assert!(store.set("k", &json!({"id": 1}), None).await);
        assert_eq!(store.get("k").await, Some(json!({"id": 1})));
        assert!(store.exists("k").await);

        assert!(store.delete("k").await);
        assert!(!store.delete("k").await);
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_applies() {
        let store = store();
        store.set("k", &json!(1), None).await;
        assert_eq!(store.ttl("k").await, Some(Duration::from_secs(60)));

        store.set("short", &json!(1), Some(Duration::from_secs(5))).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("short").await, None);
        assert!(store.exists("k").await);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_a_miss() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .set_ex("k", "{not json", Duration::from_secs(60))
            .await
            .unwrap();
        let store = CacheStore::new(backend, "orders", Duration::from_secs(60));
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_get_many_returns_every_key() {
        let store = store();
        store.set("a", &json!("A"), None).await;

        let values = store.get_many(&keys(&["a", "b", "c"])).await;
        assert_eq!(values.len(), 3);
        assert_eq!(values["a"], Some(json!("A")));
        assert_eq!(values["b"], None);
        assert!(store.get_many(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_write_extend_delete() {
        let store = store();
        let items: HashMap<String, Value> = [("a", 1), ("b", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        assert!(store.set_many(&items, Some(Duration::from_secs(10))).await);

        assert_eq!(
            store
                .extend_many_ttl(&keys(&["a", "b", "gone"]), Some(Duration::from_secs(100)))
                .await,
            2
        );
        assert!(!store.extend_ttl("gone", None).await);
        assert_eq!(store.delete_many(&keys(&["a", "b", "gone"])).await, 2);
    }

    #[tokio::test]
    async fn test_pattern_operations() {
        let store = store();
        store.set("orders:meli:S1:1", &json!(1), None).await;
        store.set("orders:meli:S1:2", &json!(2), None).await;
        store.set("ads:meli:S1:1", &json!(3), None).await;

        let found = store.get_by_pattern("orders:meli:S1:*").await;
        assert_eq!(found.len(), 2);
        assert_eq!(found["orders:meli:S1:2"], json!(2));

        assert_eq!(store.delete_by_pattern("orders:*").await, 2);
        assert_eq!(store.keys("*").await, keys(&["ads:meli:S1:1"]));
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = store();
        assert!(store.check().await.is_healthy());
        assert_eq!(HealthCheck::name(&store), "memory");
    }

    #[tokio::test]
    async fn test_from_config_uses_entity_ttl() {
        let config = CacheConfig {
            operation_timeout_ms: 50,
            ..CacheConfig::default()
        };
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let store = CacheStore::from_config(Arc::clone(&backend), "orders", &config);
        assert_eq!(store.default_ttl(), Duration::from_secs(2_592_000));

        let unknown = CacheStore::from_config(backend, "widgets", &config);
        assert_eq!(unknown.default_ttl(), Duration::from_secs(300));
    }
}
