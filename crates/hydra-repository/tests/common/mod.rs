//! Common test infrastructure for repository integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use hydra_cache::{CacheStore, MemoryBackend, TimelineIndex};
use hydra_core::{timeline_key, HydraError, HydraResult};
use hydra_repository::{Repository, SourceOfRecord};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Order entity used across tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: String,
    pub owner: String,
    pub total: u32,
}

impl Order {
    pub fn new(id: &str, owner: &str, total: u32) -> Self {
        Self {
            id: id.to_string(),
            owner: owner.to_string(),
            total,
        }
    }
}

/// In-memory source that counts every lookup.
///
/// Lookups stall for `load_delay` so concurrent callers overlap.
pub struct CountingSource {
    orders: Mutex<HashMap<String, Order>>,
    loads: AtomicUsize,
    load_delay: Duration,
    fail_loads: AtomicBool,
    fail_after_save: AtomicBool,
}

impl CountingSource {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
            load_delay: Duration::from_millis(20),
            fail_loads: AtomicBool::new(false),
            fail_after_save: AtomicBool::new(false),
        }
    }

    pub fn with_orders(orders: Vec<Order>) -> Self {
        let source = Self::new();
        for order in orders {
            source.orders.lock().unwrap().insert(order.id.clone(), order);
        }
        source
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn fail_loads(&self) {
        self.fail_loads.store(true, Ordering::SeqCst);
    }

    pub fn fail_after_save(&self) {
        self.fail_after_save.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceOfRecord<Order> for CountingSource {
    async fn load(&self, id: &str) -> HydraResult<Option<Order>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(HydraError::source("orders database unavailable"));
        }
        Ok(self.orders.lock().unwrap().get(id).cloned())
    }

    async fn save(&self, order: Order) -> HydraResult<Order> {
        if order.total == 0 {
            return Err(HydraError::validation("total must be positive"));
        }
        self.orders
            .lock()
            .unwrap()
            .insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn after_save(&self, id: &str, value: &Value, index: &TimelineIndex) -> HydraResult<()> {
        if self.fail_after_save.load(Ordering::SeqCst) {
            return Err(HydraError::DerivedIndex {
                key: id.to_string(),
                message: "timeline write rejected".to_string(),
            });
        }
        let owner = value["owner"].as_str().unwrap_or_default();
        let timeline = timeline_key(owner, "orders")?;
        index.add_reference(&timeline, id, None).await;
        Ok(())
    }
}

/// Repository over a fresh memory store.
pub fn orders_repository(source: Arc<CountingSource>) -> Repository<Order> {
    let store = CacheStore::new(Arc::new(MemoryBackend::new()), "orders", Duration::from_secs(3600));
    Repository::new(source, store)
}
