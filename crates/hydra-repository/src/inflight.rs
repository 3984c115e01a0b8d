//! Per-key miss coalescing.
//!
//! Concurrent misses on one key queue behind a single async lock so that
//! only the first reaches the source; the rest find the populated entry when
//! they re-check the cache.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A key's lock and the number of callers holding or waiting on it.
#[derive(Debug)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

/// Registry of keys with a load in progress.
#[derive(Debug, Default)]
pub struct InflightLoads {
    slots: Mutex<HashMap<String, Slot>>,
}

impl InflightLoads {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other caller holds `key`, then holds it.
    ///
    /// Dropping the returned future while it waits releases its claim.
    pub async fn acquire(&self, key: &str) -> InflightGuard<'_> {
        let lock = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        let mut guard = InflightGuard {
            loads: self,
            key: key.to_string(),
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    /// Keys currently held or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// True when no key is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(key);
            }
        }
    }
}

/// Holds one key until dropped.
pub struct InflightGuard<'a> {
    loads: &'a InflightLoads,
    key: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        self.loads.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let loads = InflightLoads::new();
        {
            let _guard = loads.acquire("k").await;
            assert_eq!(loads.len(), 1);
        }
        assert!(loads.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_is_serialized() {
        let loads = Arc::new(InflightLoads::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let loads = Arc::clone(&loads);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = loads.acquire("k").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(loads.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let loads = InflightLoads::new();
        let _a = loads.acquire("a").await;
        let _b = loads.acquire("b").await;
        assert_eq!(loads.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_leaves_no_entry() {
        let loads = InflightLoads::new();
        let holder = loads.acquire("k").await;

        let waited =
            tokio::time::timeout(Duration::from_millis(10), loads.acquire("k")).await;
        assert!(waited.is_err());
        assert_eq!(loads.len(), 1);

        drop(holder);
        assert!(loads.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_holder_released_before_waiter_cancelled() {
        let loads = Arc::new(InflightLoads::new());
        let holder = loads.acquire("k").await;

        let waiter = {
            let loads = Arc::clone(&loads);
            tokio::spawn(async move {
                let _guard = loads.acquire("k").await;
                std::future::pending::<()>().await;
            })
        };
        tokio::task::yield_now().await;

        drop(holder);
        waiter.abort();
        let _ = waiter.await;
        assert!(loads.is_empty());
    }
}
