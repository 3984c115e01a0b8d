//! # Hydra Cache
//!
//! The shared key/value store and everything layered directly on it:
//!
//! - [`backend`]: the store wire contract with Redis and in-memory backends
//! - [`CacheStore`]: fail-open typed access bound to one entity type
//! - [`TimelineIndex`]: owner-scoped secondary indices with lazy pruning
//! - [`EntityCache`]: owner-aware entity writes that keep timelines in sync
//! - [`TimelineSweeper`]: optional background pruning

pub mod backend;
mod entity_cache;
mod maintenance;
pub mod metrics;
mod store;
mod timeline;

pub use backend::{
    create_pool, pattern_matches, KvBackend, MemoryBackend, RedisBackend, RedisBackendParameters,
};
pub use entity_cache::{EntityCache, OwnerRef};
pub use maintenance::{
    cleanup_legacy_timelines, SweepReport, TimelineSweeper, LEGACY_TIMELINE_PATTERN,
};
pub use store::CacheStore;
pub use timeline::{FallbackLoader, ResolveStats, TimelineIndex, MIN_INDEX_MARGIN};
