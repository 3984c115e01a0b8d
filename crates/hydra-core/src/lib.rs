//! # Hydra Core
//!
//! Core types, traits, and error definitions for the Hydra cache engine.
//! Every other crate in the workspace depends on the error taxonomy and the
//! key formats defined here.

pub mod error;
pub mod keys;
pub mod result;
pub mod telemetry;
pub mod traits;

pub use error::*;
pub use keys::*;
pub use result::*;
pub use traits::*;

// Re-export shaku for dependency injection
pub use shaku::Interface;
