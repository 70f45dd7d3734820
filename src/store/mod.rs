//! Store Module
//!
//! The shared key-value backend consumed by the coordinator and the
//! invalidation utilities. All values are UTF-8 envelope text; TTL is an
//! eviction attribute carried by the store itself.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

#[cfg(test)]
pub(crate) use memory::glob_match as memory_glob_match;

use async_trait::async_trait;

use crate::error::Result;

// == Store Backend ==
/// Wire-level contract against the shared key-value store.
///
/// Implementations must be safe to share across tasks; the engine holds a
/// single handle per process and never pools beyond it.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Returns the stored value for `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` under `key` with no expiry.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Writes `value` under `key` with a TTL in seconds.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Writes `value` under `key` with a TTL, only if the key does not exist.
    ///
    /// Returns true when the key was newly created, false when it already
    /// existed. This is the single atomic transition the stampede guard
    /// branches on.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool>;

    /// Removes the given keys (non-blocking delete), returning how many
    /// existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Returns every key matching a glob-style pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Writes many key/value pairs in one batch, with no expiry.
    async fn mset(&self, entries: &[(String, String)]) -> Result<()>;

    /// Applies a uniform TTL to the given keys in one batch.
    async fn expire_many(&self, keys: &[String], ttl_secs: u64) -> Result<()>;
}
