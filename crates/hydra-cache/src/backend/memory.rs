//! In-process backend for tests and local development.
//!
//! Mirrors the Redis semantics the engine relies on: lazy TTL expiry,
//! `WRONGTYPE` errors when a string command hits a set (and the reverse),
//! empty sets disappearing, and `SET` clearing any previous expiry.

use super::{pattern_matches, ttl_secs, KvBackend};
use async_trait::async_trait;
use hydra_core::{HydraError, HydraResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
}

/// A single entry with optional expiration.
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

fn wrong_type(key: &str) -> HydraError {
    HydraError::store(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
        key
    ))
}

/// Expiry instant for `ttl`. `None` when the clock cannot represent it.
fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(Duration::from_secs(ttl_secs(ttl)))
}

/// Thread-safe in-memory store.
///
/// Uses `tokio::time::Instant`, so a paused test clock drives expiry.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryBackend {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Returns true when no live keys remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` on the live entry for `key`, dropping it first if expired.
    fn with_live<R>(&self, key: &str, f: impl FnOnce(Option<&mut Entry>) -> R) -> R {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
            entries.remove(key);
        }
        f(entries.get_mut(key))
    }

    fn get_string(entry: Option<&mut Entry>, key: &str) -> HydraResult<Option<String>> {
        match entry.map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(Value::Set(_)) => Err(wrong_type(key)),
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> HydraResult<Option<String>> {
        self.with_live(key, |entry| Self::get_string(entry, key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> HydraResult<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: deadline(ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> HydraResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> HydraResult<bool> {
        Ok(self.with_live(key, |entry| entry.is_some()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> HydraResult<bool> {
        Ok(self.with_live(key, |entry| match entry {
            Some(entry) => {
                entry.expires_at = deadline(ttl);
                true
            }
            None => false,
        }))
    }

    async fn ttl(&self, key: &str) -> HydraResult<Option<Duration>> {
        Ok(self.with_live(key, |entry| {
            entry
                .and_then(|e| e.expires_at)
                .map(|exp| exp.saturating_duration_since(Instant::now()))
        }))
    }

    async fn keys(&self, pattern: &str) -> HydraResult<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !entry.is_expired(now));
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| pattern_matches(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn mget(&self, keys: &[String]) -> HydraResult<Vec<Option<String>>> {
        // A set anywhere in the batch fails the whole pipeline, as in Redis.
        keys.iter()
            .map(|key| self.with_live(key, |entry| Self::get_string(entry, key)))
            .collect()
    }

    async fn mset_ex(&self, items: &[(String, String)], ttl: Duration) -> HydraResult<()> {
        let expires_at = deadline(ttl);
        let mut entries = self.entries.lock();
        for (key, value) in items {
            entries.insert(
                key.clone(),
                Entry {
                    value: Value::Str(value.clone()),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn mexpire(&self, keys: &[String], ttl: Duration) -> HydraResult<u64> {
        let mut extended = 0;
        for key in keys {
            if self.expire(key, ttl).await? {
                extended += 1;
            }
        }
        Ok(extended)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> HydraResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(set) => Ok(members
                .iter()
                .filter(|member| set.insert((*member).clone()))
                .count() as u64),
            Value::Str(_) => Err(wrong_type(key)),
        }
    }

    async fn srem(&self, key: &str, members: &[String]) -> HydraResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        let Some(entry) = entries.get_mut(key) else {
            return Ok(0);
        };
        let (removed, now_empty) = match &mut entry.value {
            Value::Set(set) => {
                let removed = members.iter().filter(|member| set.remove(*member)).count();
                (removed as u64, set.is_empty())
            }
            Value::Str(_) => return Err(wrong_type(key)),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> HydraResult<HashSet<String>> {
        self.with_live(key, |entry| match entry.map(|e| &e.value) {
            None => Ok(HashSet::new()),
            Some(Value::Set(set)) => Ok(set.clone()),
            Some(Value::Str(_)) => Err(wrong_type(key)),
        })
    }

    async fn ping(&self) -> HydraResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_lazily() {
        let backend = MemoryBackend::new();
        backend.set_ex("k", "1", Duration::from_secs(5)).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("1".to_string()));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(!backend.exists("k").await.unwrap());
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_second_ttl_rounds_up() {
        let backend = MemoryBackend::new();
        backend.set_ex("k", "1", Duration::from_millis(1)).await.unwrap();
        tokio::time::advance(Duration::from_millis(900)).await;
        assert!(backend.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_sets_and_wrong_type() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.sadd("s", &keys(&["a", "b", "a"])).await.unwrap(), 2);
        assert_eq!(backend.smembers("s").await.unwrap().len(), 2);
        assert!(backend.get("s").await.is_err());

        backend.set_ex("str", "x", Duration::from_secs(10)).await.unwrap();
        assert!(backend.sadd("str", &keys(&["a"])).await.is_err());

        assert_eq!(backend.srem("s", &keys(&["a", "b", "z"])).await.unwrap(), 2);
        assert!(!backend.exists("s").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_has_no_expiry_until_expire() {
        let backend = MemoryBackend::new();
        backend.sadd("s", &keys(&["a"])).await.unwrap();
        assert_eq!(backend.ttl("s").await.unwrap(), None);

        assert!(backend.expire("s", Duration::from_secs(200)).await.unwrap());
        assert_eq!(backend.ttl("s").await.unwrap(), Some(Duration::from_secs(200)));
        assert!(!backend.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_operations() {
        let backend = MemoryBackend::new();
        let items = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        backend.mset_ex(&items, Duration::from_secs(60)).await.unwrap();

        let values = backend.mget(&keys(&["a", "missing", "b"])).await.unwrap();
        assert_eq!(
            values,
            vec![Some("1".to_string()), None, Some("2".to_string())]
        );

        assert_eq!(
            backend
                .mexpire(&keys(&["a", "missing"]), Duration::from_secs(5))
                .await
                .unwrap(),
            1
        );
        assert_eq!(backend.del(&keys(&["a", "b", "missing"])).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_mget_fails_whole_batch_on_set() {
        let backend = MemoryBackend::new();
        backend.set_ex("a", "1", Duration::from_secs(60)).await.unwrap();
        backend.sadd("set", &keys(&["m"])).await.unwrap();

        assert!(backend.mget(&keys(&["a", "set"])).await.is_err());
        assert!(backend.mget(&keys(&["a"])).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_means_no_expiry() {
        let backend = MemoryBackend::new();
        let huge = Duration::from_secs(u64::MAX / 2);

        backend.set_ex("k", "1", huge).await.unwrap();
        assert_eq!(backend.ttl("k").await.unwrap(), None);

        let items = vec![("b".to_string(), "2".to_string())];
        backend.mset_ex(&items, huge).await.unwrap();
        backend.sadd("s", &keys(&["a"])).await.unwrap();
        assert!(backend.expire("s", huge).await.unwrap());

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(backend.get("k").await.unwrap(), Some("1".to_string()));
        assert_eq!(backend.get("b").await.unwrap(), Some("2".to_string()));
        assert!(backend.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_by_pattern() {
        let backend = MemoryBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set_ex("user:U1:orders:1", "{}", ttl).await.unwrap();
        backend.set_ex("user:U2:ads:9", "{}", ttl).await.unwrap();
        backend.sadd("user:U1:orders:timeline", &keys(&["x"])).await.unwrap();

        assert_eq!(
            backend.keys("user:*:timeline").await.unwrap(),
            keys(&["user:U1:orders:timeline"])
        );
        assert_eq!(backend.keys("user:U1:*").await.unwrap().len(), 2);
    }
}
