//! Owner-aware cache for one entity type.
//!
//! Every owned entity is written under its canonical key and referenced from
//! the owner's timeline (`user:{owner}:{entity_type}:timeline`). Collaborator
//! accounts read and write through their master's timeline.

use crate::store::CacheStore;
use crate::timeline::TimelineIndex;
use hydra_core::{entity_id_from_key, format_key, timeline_key, Discriminators, HydraResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// Identifies who owns an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    /// The acting owner.
    pub owner: String,
    /// Master account when `owner` is a collaborator.
    pub master: Option<String>,
}

impl OwnerRef {
    /// An owner acting for themselves.
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            master: None,
        }
    }

    /// A collaborator acting inside `master`'s account.
    #[must_use]
    pub fn collaborator(owner: impl Into<String>, master: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            master: Some(master.into()),
        }
    }

    /// The owner whose keys and timeline are used.
    #[must_use]
    pub fn effective(&self) -> &str {
        self.master.as_deref().unwrap_or(&self.owner)
    }
}

impl From<&str> for OwnerRef {
    fn from(owner: &str) -> Self {
        Self::new(owner)
    }
}

/// Owner-scoped cache operations for one entity type.
#[derive(Debug, Clone)]
pub struct EntityCache {
    index: TimelineIndex,
}

impl EntityCache {
    /// Creates a cache over `store` with the minimum timeline margin.
    #[must_use]
    pub fn new(store: CacheStore) -> Self {
        Self {
            index: TimelineIndex::new(store),
        }
    }

    /// Creates a cache sharing an existing timeline index.
    #[must_use]
    pub fn with_index(index: TimelineIndex) -> Self {
        Self { index }
    }

    /// Entity type of the underlying store.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        self.index.store().entity_type()
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &CacheStore {
        self.index.store()
    }

    /// Underlying timeline index.
    #[must_use]
    pub fn index(&self) -> &TimelineIndex {
        &self.index
    }

    /// Canonical key for an entity, formatted for the effective owner.
    pub fn entity_key(&self, owner: &OwnerRef, parts: &Discriminators) -> HydraResult<String> {
        let parts = parts.clone().owner(owner.effective());
        format_key(self.entity_type(), &parts)
    }

    /// Timeline key of the effective owner.
    pub fn timeline_key(&self, owner: &OwnerRef) -> HydraResult<String> {
        timeline_key(owner.effective(), self.entity_type())
    }

    /// Stores an entity and references it from the owner's timeline.
    ///
    /// The timeline write is best-effort; the result reports the entity write.
    pub async fn set_owned_entity(
        &self,
        owner: &OwnerRef,
        parts: &Discriminators,
        value: &Value,
        ttl: Option<Duration>,
    ) -> HydraResult<bool> {
        let key = self.entity_key(owner, parts)?;
        let timeline = self.timeline_key(owner)?;

        let stored = self.store().set(&key, value, ttl).await;
        self.index.add_reference(&timeline, &key, ttl).await;
        Ok(stored)
    }

    /// Reads one owned entity.
    pub async fn get_owned_entity(
        &self,
        owner: &OwnerRef,
        parts: &Discriminators,
    ) -> HydraResult<Option<Value>> {
        let key = self.entity_key(owner, parts)?;
        Ok(self.store().get(&key).await)
    }

    /// Deletes an entity and drops its timeline reference.
    pub async fn delete_owned_entity(
        &self,
        owner: &OwnerRef,
        parts: &Discriminators,
    ) -> HydraResult<bool> {
        let key = self.entity_key(owner, parts)?;
        let timeline = self.timeline_key(owner)?;

        let removed = self.store().delete(&key).await;
        self.index.remove_reference(&timeline, &key).await;
        Ok(removed)
    }

    /// Extends one entity and refreshes the timeline margin.
    pub async fn extend_owned_entity_ttl(
        &self,
        owner: &OwnerRef,
        parts: &Discriminators,
        ttl: Option<Duration>,
    ) -> HydraResult<bool> {
        let key = self.entity_key(owner, parts)?;
        let timeline = self.timeline_key(owner)?;

        let extended = self.store().extend_ttl(&key, ttl).await;
        self.index.refresh(&timeline, ttl).await;
        Ok(extended)
    }

    /// Every live entity on the owner's timeline, keyed by entity id.
    ///
    /// Dead references met on the way are pruned.
    pub async fn owned_entities(&self, owner: &OwnerRef) -> HydraResult<HashMap<String, Value>> {
        let timeline = self.timeline_key(owner)?;
        let resolved = self.index.resolve(&timeline, None, false).await;

        let entities: HashMap<String, Value> = resolved
            .into_iter()
            .filter_map(|(key, value)| Some((entity_id_from_key(&key)?, value?)))
            .collect();

        debug!(timeline = %timeline, count = entities.len(), "Loaded owned entities");
        Ok(entities)
    }

    /// Keys referenced by the owner's timeline.
    pub async fn timeline_members(&self, owner: &OwnerRef) -> HydraResult<HashSet<String>> {
        let timeline = self.timeline_key(owner)?;
        Ok(self.index.members(&timeline).await)
    }

    /// Extends every entity on the owner's timeline.
    ///
    /// Returns how many entities still existed.
    pub async fn extend_all_owned_ttl(
        &self,
        owner: &OwnerRef,
        ttl: Option<Duration>,
    ) -> HydraResult<u64> {
        let timeline = self.timeline_key(owner)?;
        let members: Vec<String> = self.index.members(&timeline).await.into_iter().collect();
        if members.is_empty() {
            return Ok(0);
        }

        let extended = self.store().extend_many_ttl(&members, ttl).await;
        self.index.refresh(&timeline, ttl).await;
        Ok(extended)
    }

    /// Deletes every entity on the owner's timeline and the timeline itself.
    pub async fn clear_owner_timeline(&self, owner: &OwnerRef) -> HydraResult<u64> {
        let timeline = self.timeline_key(owner)?;
        Ok(self.index.clear(&timeline).await)
    }
}
