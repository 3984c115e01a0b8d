//! Source-of-record trait definitions.

use async_trait::async_trait;
use hydra_cache::TimelineIndex;
use hydra_core::{entity_id_from_key, HydraResult, Interface};
use serde::Serialize;
use serde_json::Value;

/// The authoritative store behind a [`Repository`](crate::Repository).
///
/// Only `load` and `save` are required. The remaining hooks have defaults
/// that fit entities cached under the canonical key formats.
#[async_trait]
pub trait SourceOfRecord<T>: Interface + Send + Sync
where
    T: Serialize + Send + Sync + 'static,
{
    /// Loads an entity by id. `Ok(None)` when it does not exist.
    async fn load(&self, id: &str) -> HydraResult<Option<T>>;

    /// Persists an entity and returns the stored version.
    ///
    /// Validation failures are returned as errors and reach the caller.
    async fn save(&self, entity: T) -> HydraResult<T>;

    /// Converts an entity into its cached form.
    fn serialize(&self, entity: &T) -> HydraResult<Value> {
        Ok(serde_json::to_value(entity)?)
    }

    /// Extracts the source id from a cache key.
    ///
    /// `None` makes the repository use the whole key as the id.
    fn parse_id_from_key(&self, key: &str) -> Option<String> {
        entity_id_from_key(key)
    }

    /// Maintains derived indices after a successful save.
    ///
    /// Failures are logged and counted by the repository, never returned.
    async fn after_save(&self, _id: &str, _value: &Value, _index: &TimelineIndex) -> HydraResult<()> {
        Ok(())
    }
}
