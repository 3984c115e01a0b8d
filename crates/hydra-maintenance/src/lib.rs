//! # Hydra Maintenance
//!
//! Composition root for the cache engine: dependency injection for the
//! store backend and the timeline maintenance worker.

pub mod di;
pub mod startup;
pub mod worker;

pub use worker::{run_worker, WorkerReport, TIMELINE_ENTITY};
