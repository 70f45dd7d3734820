//! Stampede Cache - coordinated memoization over a shared key-value store
//!
//! Cache-aside engine with stampede protection: memoizes arbitrary expensive
//! computations under derived keys, guaranteeing that across many concurrent
//! callers and processes sharing one store backend, one caller computes per
//! key per miss episode while the rest wait and read the published result.
//! Supports TTL expiry, a process-local fallback cache, lossless numeric
//! serialization, and explicit invalidation.

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod invalidate;
pub mod key;
pub mod local;
pub mod memoize;
pub mod retry;
pub mod store;
pub mod timeout;


pub use codec::NumericMode;
pub use config::CacheConfig;
pub use coordinator::{Cache, ResolveOptions, BLOCK_TTL_SECS, PENDING_MARKER, POLL_INTERVAL_MS};
pub use error::{CacheError, Result};
pub use key::derive_key;
pub use local::LocalCache;
pub use memoize::{MemoOptions, Memoized};
pub use retry::retry;
pub use store::{MemoryStore, RedisStore, StoreBackend};
pub use timeout::with_timeout;
