//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is absent and no default was supplied to a strict read
    #[error("Key missed in cache: {0}")]
    MissingKey(String),

    /// Key is empty or otherwise unusable
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Store connection could not be established within the retry budget
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store command failed
    #[error("Store command failed: {0}")]
    Store(#[from] redis::RedisError),

    /// Stored value is not a well-formed envelope
    #[error("Malformed cache entry: {0}")]
    Parse(#[from] serde_json::Error),

    /// Producer did not finish within the configured deadline
    #[error("Execution timed out after {0}ms")]
    Timeout(u64),

    /// The producer function itself failed
    #[error(transparent)]
    Producer(#[from] anyhow::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
