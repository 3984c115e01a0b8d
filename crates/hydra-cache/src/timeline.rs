//! Owner-scoped secondary indices ("timelines").
//!
//! A timeline is a set of member keys stored under one index key. Members
//! expire on their own; dead references are pruned lazily the next time the
//! timeline is resolved (or by the optional sweep), never eagerly.
//!
//! The index TTL is kept at `margin × ttl` of the entries most recently
//! written through it (margin ≥ 2), so an index never expires before the
//! members it points at.

use crate::metrics::TimelineMetrics;
use crate::store::CacheStore;
use hydra_core::{BoxFuture, HydraResult};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Smallest allowed ratio between index TTL and member TTL.
pub const MIN_INDEX_MARGIN: u32 = 2;

/// Rehydrates one missing timeline member.
///
/// `Ok(Some(_))` heals the member, `Ok(None)` means it is gone for good and
/// the reference is dropped, and `Err(_)` leaves the reference in place so a
/// transient source failure does not erase it.
pub trait FallbackLoader: Send + Sync {
    /// Loads the value for `member_key`.
    fn load<'a>(&'a self, member_key: &'a str) -> BoxFuture<'a, Option<Value>>;
}

impl<F, Fut> FallbackLoader for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = HydraResult<Option<Value>>> + Send + 'static,
{
    fn load<'a>(&'a self, member_key: &'a str) -> BoxFuture<'a, Option<Value>> {
        Box::pin(self(member_key.to_string()))
    }
}

/// Outcome of a single resolve.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveStats {
    /// Members served straight from the cache.
    pub hits: usize,
    /// Members rehydrated by the fallback loader.
    pub healed: usize,
    /// Dead references removed.
    pub pruned: usize,
    /// Members whose loader failed; kept for a later attempt.
    pub failed: usize,
}

/// Secondary index operations over a [`CacheStore`].
#[derive(Debug, Clone)]
pub struct TimelineIndex {
    store: CacheStore,
    margin: u32,
}

impl TimelineIndex {
    /// Creates an index with the minimum margin.
    #[must_use]
    pub fn new(store: CacheStore) -> Self {
        Self {
            store,
            margin: MIN_INDEX_MARGIN,
        }
    }

    /// Sets the margin; values below the minimum are raised to it.
    #[must_use]
    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin.max(MIN_INDEX_MARGIN);
        self
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Configured margin.
    #[must_use]
    pub fn margin(&self) -> u32 {
        self.margin
    }

    /// Index TTL required after writing entries with `entry_ttl`.
    #[must_use]
    pub fn index_ttl(&self, entry_ttl: Duration) -> Duration {
        entry_ttl.saturating_mul(self.margin)
    }

    /// Resets the index TTL to the margin for entries written with `entry_ttl`.
    pub async fn refresh(&self, index_key: &str, entry_ttl: Option<Duration>) -> bool {
        let entry_ttl = entry_ttl.unwrap_or_else(|| self.store.default_ttl());
        self.store
            .extend_ttl(index_key, Some(self.index_ttl(entry_ttl)))
            .await
    }

    /// Adds `member_key` to the index and refreshes the index TTL.
    ///
    /// Returns true when the index is live with a fresh TTL afterwards.
    pub async fn add_reference(
        &self,
        index_key: &str,
        member_key: &str,
        ttl: Option<Duration>,
    ) -> bool {
        self.store
            .add_members(index_key, &[member_key.to_string()])
            .await;
        let refreshed = self.refresh(index_key, ttl).await;
        debug!(index_key, member_key, refreshed, "Added timeline reference");
        refreshed
    }

    /// Adds `member_key` to every index in `index_keys`.
    ///
    /// Returns how many indices were updated.
    pub async fn add_reference_to_sets(
        &self,
        member_key: &str,
        index_keys: &[String],
        ttl: Option<Duration>,
    ) -> usize {
        let mut updated = 0;
        for index_key in index_keys {
            if self.add_reference(index_key, member_key, ttl).await {
                updated += 1;
            }
        }
        updated
    }

    /// Removes `member_key` from the index. False if it was not a member.
    pub async fn remove_reference(&self, index_key: &str, member_key: &str) -> bool {
        self.store
            .remove_members(index_key, &[member_key.to_string()])
            .await
            > 0
    }

    /// Current members, including ones whose entries already expired.
    pub async fn members(&self, index_key: &str) -> HashSet<String> {
        self.store.members(index_key).await
    }

    /// Resolves every member to its value, healing or pruning dead ones.
    ///
    /// See [`resolve_with_stats`](Self::resolve_with_stats).
    pub async fn resolve(
        &self,
        index_key: &str,
        loader: Option<&dyn FallbackLoader>,
        readd_on_success: bool,
    ) -> HashMap<String, Option<Value>> {
        self.resolve_with_stats(index_key, loader, readd_on_success)
            .await
            .0
    }

    /// Resolves every member to its value.
    ///
    /// 1. Fetch the membership set.
    /// 2. Batch-fetch member values.
    /// 3. For each missing member, ask `loader`. A recovered value is written
    ///    back under the member key and, with `readd_on_success`, the
    ///    reference is re-added. A member the loader cannot find (or any
    ///    missing member when there is no loader) is removed from the index.
    /// 4. If anything was written, the index TTL is reset to the margin.
    ///
    /// The result has one entry per member seen in step 1. If the batch read
    /// itself fails, every member maps to `None` and nothing is pruned.
    pub async fn resolve_with_stats(
        &self,
        index_key: &str,
        loader: Option<&dyn FallbackLoader>,
        readd_on_success: bool,
    ) -> (HashMap<String, Option<Value>>, ResolveStats) {
        let mut stats = ResolveStats::default();

        let mut member_keys: Vec<String> = self.members(index_key).await.into_iter().collect();
        if member_keys.is_empty() {
            return (HashMap::new(), stats);
        }
        member_keys.sort();

        let mut values = match self.store.try_get_many(&member_keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(index_key, error = %e, "Timeline read failed, skipping self-heal");
                let values = member_keys.into_iter().map(|key| (key, None)).collect();
                return (values, stats);
            }
        };

        let mut dead = Vec::new();
        let mut healed = Vec::new();

        for key in &member_keys {
            if values.get(key).is_some_and(Option::is_some) {
                stats.hits += 1;
                continue;
            }

            let Some(loader) = loader else {
                dead.push(key.clone());
                continue;
            };

            match loader.load(key).await {
                Ok(Some(value)) => {
                    if self.store.set(key, &value, None).await {
                        healed.push(key.clone());
                    }
                    values.insert(key.clone(), Some(value));
                    stats.healed += 1;
                }
                Ok(None) => dead.push(key.clone()),
                Err(e) => {
                    error!(index_key, member_key = %key, error = %e, "Fallback failed to recover reference");
                    stats.failed += 1;
                }
            }
        }

        if !dead.is_empty() {
            let removed = self.store.remove_members(index_key, &dead).await;
            stats.pruned = dead.len();
            TimelineMetrics::pruned(removed);
            debug!(index_key, pruned = removed, "Pruned dead timeline references");
        }

        if !healed.is_empty() {
            TimelineMetrics::healed(healed.len() as u64);
            if readd_on_success {
                self.store.add_members(index_key, &healed).await;
                self.refresh(index_key, None).await;
            }
        }

        (values, stats)
    }

    /// Removes references whose entries no longer exist, without loading anything.
    ///
    /// Returns how many references were removed.
    pub async fn prune(&self, index_key: &str) -> u64 {
        let (_, stats) = self.resolve_with_stats(index_key, None, false).await;
        stats.pruned as u64
    }

    /// Deletes every member entry, then the index itself.
    ///
    /// Not transactional: a member added concurrently may survive. Returns
    /// how many member entries were deleted.
    pub async fn clear(&self, index_key: &str) -> u64 {
        let members: Vec<String> = self.members(index_key).await.into_iter().collect();
        let removed = self.store.delete_many(&members).await;
        self.store.delete(index_key).await;
        debug!(index_key, removed, "Cleared timeline");
        removed
    }
}
