//! Cache-aside repository.
//!
//! ```text
//! caller
//!   ↓ get / save / invalidate
//! Repository<T>            ← cache-aside policy, hooks, metrics
//!   ↓ CacheStore            (fail-open)      ↓ Arc<dyn SourceOfRecord<T>>
//! Redis / memory                             database, API, …
//! ```
//!
//! Reads check the cache first and fall back to the source on a miss. Store
//! failures behave like misses. Source and validation errors propagate.

use crate::inflight::InflightLoads;
use crate::traits::SourceOfRecord;
use hydra_cache::metrics::CacheMetrics;
use hydra_cache::{CacheStore, FallbackLoader, TimelineIndex};
use hydra_config::CacheConfig;
use hydra_core::{BoxFuture, HydraResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache-aside access to entities of type `T`.
pub struct Repository<T>
where
    T: Serialize + Send + Sync + 'static,
{
    source: Arc<dyn SourceOfRecord<T>>,
    index: TimelineIndex,
    inflight: Option<InflightLoads>,
}

impl<T> Repository<T>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Creates a repository over `store` with the minimum index margin.
    #[must_use]
    pub fn new(source: Arc<dyn SourceOfRecord<T>>, store: CacheStore) -> Self {
        Self::with_index(source, TimelineIndex::new(store))
    }

    /// Creates a repository sharing an existing timeline index.
    #[must_use]
    pub fn with_index(source: Arc<dyn SourceOfRecord<T>>, index: TimelineIndex) -> Self {
        Self {
            source,
            index,
            inflight: None,
        }
    }

    /// Creates a repository using the configured margin and coalescing mode.
    #[must_use]
    pub fn from_config(
        source: Arc<dyn SourceOfRecord<T>>,
        store: CacheStore,
        config: &CacheConfig,
    ) -> Self {
        let index = TimelineIndex::new(store).with_margin(config.index_margin);
        let repository = Self::with_index(source, index);
        if config.coalesce_misses {
            repository.with_coalescing()
        } else {
            repository
        }
    }

    /// Makes concurrent misses on the same key share one source load.
    #[must_use]
    pub fn with_coalescing(mut self) -> Self {
        self.inflight = Some(InflightLoads::new());
        self
    }

    /// Underlying cache store.
    #[must_use]
    pub fn store(&self) -> &CacheStore {
        self.index.store()
    }

    /// Underlying timeline index.
    #[must_use]
    pub fn index(&self) -> &TimelineIndex {
        &self.index
    }

    /// The source of record.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn SourceOfRecord<T>> {
        &self.source
    }

    fn source_id(&self, key: &str) -> String {
        self.source
            .parse_id_from_key(key)
            .unwrap_or_else(|| key.to_string())
    }

    /// Loads from the source and, when found, caches under `key`.
    async fn load_and_populate(&self, key: &str) -> HydraResult<Option<Value>> {
        let id = self.source_id(key);
        let entity = self.source.load(&id).await?;
        CacheMetrics::source_load(self.store().entity_type(), entity.is_some());

        let Some(entity) = entity else {
            debug!(key, id = %id, "Entity not found in source");
            return Ok(None);
        };

        let value = self.source.serialize(&entity)?;
        self.store().set(key, &value, None).await;
        debug!(key, id = %id, "Loaded entity from source");
        Ok(Some(value))
    }

    /// Miss path, coalesced when enabled.
    async fn on_miss(&self, key: &str) -> HydraResult<Option<Value>> {
        let Some(inflight) = &self.inflight else {
            return self.load_and_populate(key).await;
        };

        let _guard = inflight.acquire(key).await;
        if let Some(value) = self.store().get(key).await {
            return Ok(Some(value));
        }
        self.load_and_populate(key).await
    }

    /// Reads `key`, loading from the source on a miss.
    ///
    /// A miss costs exactly one source lookup. Without coalescing, concurrent
    /// misses on the same key each reach the source.
    pub async fn get(&self, key: &str) -> HydraResult<Option<Value>> {
        if let Some(value) = self.store().get(key).await {
            return Ok(Some(value));
        }
        self.on_miss(key).await
    }

    /// Reads many keys. Hits come from one batch read; each miss is loaded
    /// on its own.
    ///
    /// The result has exactly the input keys.
    pub async fn get_many(&self, keys: &[String]) -> HydraResult<HashMap<String, Option<Value>>> {
        let mut values = self.store().get_many(keys).await;

        let mut seen = HashSet::new();
        let misses: Vec<String> = keys
            .iter()
            .filter(|key| values.get(*key).map_or(true, Option::is_none))
            .filter(|key| seen.insert(key.as_str()))
            .cloned()
            .collect();

        for key in misses {
            let value = self.on_miss(&key).await?;
            values.insert(key, value);
        }

        Ok(values)
    }

    /// Saves through the source, then caches the stored version under `id`.
    ///
    /// Returns the cached form. Source errors propagate and leave the cache
    /// untouched; a failing `after_save` hook is logged and ignored.
    pub async fn save(&self, id: &str, entity: T) -> HydraResult<Value> {
        let saved = self.source.save(entity).await?;
        let value = self.source.serialize(&saved)?;

        if !self.store().set(id, &value, None).await {
            warn!(key = id, "Saved entity could not be cached");
        }

        if let Err(e) = self.source.after_save(id, &value, &self.index).await {
            warn!(key = id, error = %e, "after_save hook failed");
            CacheMetrics::after_save_failed(self.store().entity_type());
        }

        Ok(value)
    }

    /// Drops the cached entry. False if nothing was cached.
    pub async fn invalidate(&self, id: &str) -> bool {
        let removed = self.store().delete(id).await;
        debug!(key = id, removed, "Invalidated cache entry");
        removed
    }

    /// Writes a raw value to any key.
    pub async fn write_cache_value(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool {
        self.store().set(key, value, ttl).await
    }

    /// Adds `value_key` to every set in `set_keys`.
    pub async fn add_reference_to_sets(
        &self,
        value_key: &str,
        set_keys: &[String],
        ttl: Option<Duration>,
    ) -> usize {
        self.index.add_reference_to_sets(value_key, set_keys, ttl).await
    }

    /// Resolves every member of `set_key`. See [`TimelineIndex::resolve`].
    pub async fn get_values_by_set(
        &self,
        set_key: &str,
        loader: Option<&dyn FallbackLoader>,
        readd_on_success: bool,
    ) -> HashMap<String, Option<Value>> {
        self.index.resolve(set_key, loader, readd_on_success).await
    }

    /// Resolves every member of `set_key`, rehydrating dead members from the
    /// source of record.
    pub async fn get_values_by_set_from_source(
        &self,
        set_key: &str,
        readd_on_success: bool,
    ) -> HashMap<String, Option<Value>> {
        let loader = SourceLoader { repository: self };
        self.index
            .resolve(set_key, Some(&loader), readd_on_success)
            .await
    }
}

/// Fallback loader reading members back from the source of record.
struct SourceLoader<'r, T>
where
    T: Serialize + Send + Sync + 'static,
{
    repository: &'r Repository<T>,
}

impl<T> FallbackLoader for SourceLoader<'_, T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn load<'a>(&'a self, member_key: &'a str) -> BoxFuture<'a, Option<Value>> {
        Box::pin(async move {
            let source = &self.repository.source;
            let id = self.repository.source_id(member_key);
            match source.load(&id).await? {
                Some(entity) => Ok(Some(source.serialize(&entity)?)),
                None => Ok(None),
            }
        })
    }
}

impl<T> std::fmt::Debug for Repository<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("index", &self.index)
            .field("coalescing", &self.inflight.is_some())
            .finish()
    }
}
