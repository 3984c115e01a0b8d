//! Result type aliases for Hydra.

use crate::HydraError;

/// A specialized `Result` type for Hydra operations.
pub type HydraResult<T> = Result<T, HydraError>;

/// A boxed future returning a `HydraResult`.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = HydraResult<T>> + Send + 'a>>;
