//! Integration tests against a live Redis.
//!
//! Set `REDIS_URL` to point at a server; every test is skipped when Redis is
//! not reachable.

mod common;

use common::{redis_backend, unique_prefix};
use hydra_cache::{CacheStore, TimelineIndex};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

async fn get_test_store() -> Option<CacheStore> {
    let backend = redis_backend().await?;
    Some(CacheStore::new(backend, "orders", Duration::from_secs(60)))
}

#[tokio::test]
async fn test_redis_set_get_delete() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: Redis not available");
        return;
    };
    let key = format!("{}:entry", unique_prefix("set_get"));

    assert!(store.set(&key, &json!({"id": 1}), None).await);
    assert_eq!(store.get(&key).await, Some(json!({"id": 1})));

    let ttl = store.ttl(&key).await.unwrap();
    assert!(ttl <= Duration::from_secs(60));
    assert!(ttl > Duration::from_secs(50));

    assert!(store.delete(&key).await);
    assert!(!store.delete(&key).await);
}

#[tokio::test]
async fn test_redis_batch_operations() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: Redis not available");
        return;
    };
    let prefix = unique_prefix("batch");
    let keys: Vec<String> = (0..3).map(|i| format!("{prefix}:{i}")).collect();

    let items: HashMap<String, Value> = keys[..2]
        .iter()
        .map(|k| (k.clone(), json!(k)))
        .collect();
    assert!(store.set_many(&items, None).await);

    let values = store.get_many(&keys).await;
    assert_eq!(values.len(), 3);
    assert_eq!(values[&keys[0]], Some(json!(keys[0])));
    assert_eq!(values[&keys[2]], None);

    assert_eq!(
        store.extend_many_ttl(&keys, Some(Duration::from_secs(120))).await,
        2
    );
    assert_eq!(store.delete_by_pattern(&format!("{prefix}:*")).await, 2);
}

#[tokio::test]
async fn test_redis_timeline_prunes_missing_members() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: Redis not available");
        return;
    };
    let prefix = unique_prefix("timeline");
    let timeline = format!("{prefix}:timeline");
    let live = format!("{prefix}:live");
    let dead = format!("{prefix}:dead");

    let index = TimelineIndex::new(store);
    index.store().set(&live, &json!("here"), None).await;
    index.add_reference(&timeline, &live, None).await;
    index.add_reference(&timeline, &dead, None).await;

    let index_ttl = index.store().ttl(&timeline).await.unwrap();
    assert!(index_ttl > Duration::from_secs(60));

    let resolved = index.resolve(&timeline, None, false).await;
    assert_eq!(resolved[&live], Some(json!("here")));
    assert_eq!(resolved[&dead], None);

    let members = index.members(&timeline).await;
    assert!(members.contains(&live));
    assert!(!members.contains(&dead));

    assert_eq!(index.clear(&timeline).await, 1);
}
