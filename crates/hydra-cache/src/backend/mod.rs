//! Key/value backends.
//!
//! A backend speaks the store wire contract (strings with expiry, sets,
//! pattern scan, pipelined batches) and reports every failure as an error.
//! Converting those errors into misses is the job of [`CacheStore`](crate::CacheStore),
//! never of the backend.

mod memory;
mod redis;

pub use self::memory::MemoryBackend;
pub use self::redis::{create_pool, RedisBackend, RedisBackendParameters};

use async_trait::async_trait;
use hydra_core::{HydraResult, Interface};
use std::collections::HashSet;
use std::time::Duration;

/// Raw key/value operations against the shared store.
///
/// Values are opaque JSON text. TTLs shorter than one second are rounded up
/// to one second, matching Redis `SETEX`/`EXPIRE` granularity.
#[async_trait]
pub trait KvBackend: Interface + Send + Sync {
    /// Short backend name used in logs and health reports.
    fn name(&self) -> &'static str;

    /// `GET key`.
    async fn get(&self, key: &str) -> HydraResult<Option<String>>;

    /// `SET key value EX ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> HydraResult<()>;

    /// `DEL keys...`, returning how many existed.
    async fn del(&self, keys: &[String]) -> HydraResult<u64>;

    /// `EXISTS key`.
    async fn exists(&self, key: &str) -> HydraResult<bool>;

    /// `EXPIRE key ttl`, returning false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> HydraResult<bool>;

    /// `TTL key`. `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> HydraResult<Option<Duration>>;

    /// `KEYS pattern` with Redis glob syntax.
    async fn keys(&self, pattern: &str) -> HydraResult<Vec<String>>;

    /// Pipelined `GET` for every key, in input order.
    async fn mget(&self, keys: &[String]) -> HydraResult<Vec<Option<String>>>;

    /// Pipelined `SET EX` for every item.
    async fn mset_ex(&self, items: &[(String, String)], ttl: Duration) -> HydraResult<()>;

    /// Pipelined `EXPIRE`, returning how many keys existed.
    async fn mexpire(&self, keys: &[String], ttl: Duration) -> HydraResult<u64>;

    /// `SADD key members...`, returning how many were new.
    async fn sadd(&self, key: &str, members: &[String]) -> HydraResult<u64>;

    /// `SREM key members...`, returning how many were present.
    async fn srem(&self, key: &str, members: &[String]) -> HydraResult<u64>;

    /// `SMEMBERS key`.
    async fn smembers(&self, key: &str) -> HydraResult<HashSet<String>>;

    /// `PING`.
    async fn ping(&self) -> HydraResult<()>;
}

/// Whole seconds for a TTL, never below one.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Matches a key against a Redis-style glob.
///
/// Supports `*` (any run, including empty), `?` (one char), and `\` escapes.
#[must_use]
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, k));
                p += 1;
            }
            Some('?') => {
                p += 1;
                k += 1;
            }
            Some('\\') if pattern.get(p + 1) == Some(&key[k]) => {
                p += 2;
                k += 1;
            }
            Some(c) if *c != '\\' && *c == key[k] => {
                p += 1;
                k += 1;
            }
            _ => match star {
                Some((star_p, star_k)) => {
                    p = star_p + 1;
                    k = star_k + 1;
                    star = Some((star_p, star_k + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
