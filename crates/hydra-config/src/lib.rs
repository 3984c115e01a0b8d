//! # Hydra Config
//!
//! Configuration management for the Hydra cache engine.
//! Supports layered configuration from files, environment variables,
//! and runtime refresh.

mod app_config;
mod environment;
mod loader;
mod validation;

pub use app_config::*;
pub use environment::*;
pub use loader::*;
pub use validation::*;
