//! # Hydra Repository
//!
//! Cache-aside access to a source of record:
//!
//! ```text
//! src/
//!   traits.rs       ← SourceOfRecord trait and hook defaults
//!   repository.rs   ← Repository<T>
//!   inflight.rs     ← opt-in per-key miss coalescing
//! ```

pub mod inflight;
pub mod repository;
pub mod traits;

pub use inflight::{InflightGuard, InflightLoads};
pub use repository::Repository;
pub use traits::SourceOfRecord;
