//! Coordinator Module
//!
//! Get-or-set with a stampede guard: across many concurrent callers and many
//! processes sharing one store, at most one caller per key runs the expensive
//! producer per cache-miss episode while the rest wait for the published
//! result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, warn};

use crate::codec::{self, NumericMode};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::local::LocalCache;
use crate::store::{MemoryStore, RedisStore, StoreBackend};
use crate::timeout::with_timeout;

// == Protocol Constants ==
/// Sentinel value signaling "computation in progress" for a key.
pub const PENDING_MARKER: &str = "blocked";

/// Lifetime of the pending marker. Bounds how long a crashed or slow producer
/// can block other callers.
pub const BLOCK_TTL_SECS: u64 = 5;

/// Interval between polls while another caller holds the pending marker.
pub const POLL_INTERVAL_MS: u64 = 200;

/// Overall deadline for the wait loop; exceeding it fails with a timeout
/// instead of polling forever.
const WAIT_DEADLINE_MS: u64 = 2 * BLOCK_TTL_SECS * 1000;

// == Resolve Options ==
/// Per-call configuration for [`Cache::resolve`].
#[derive(Debug)]
pub struct ResolveOptions<T> {
    /// Bypass the store entirely and invoke the producer directly
    pub disabled: bool,
    /// Surface failures to the caller instead of falling back to `default`
    pub throw_on_error: bool,
    /// Optional producer deadline in milliseconds
    pub timeout_ms: Option<u64>,
    /// Value returned on failure when `throw_on_error` is unset
    pub default: Option<T>,
    /// Numeric handling for decoded entries
    pub numeric_mode: NumericMode,
}

impl<T> Default for ResolveOptions<T> {
    fn default() -> Self {
        Self {
            disabled: false,
            throw_on_error: false,
            timeout_ms: None,
            default: None,
            numeric_mode: NumericMode::Standard,
        }
    }
}

/// Outcome of the wait-or-acquire loop.
enum Probe<T> {
    /// A present entry decoded successfully
    Hit(T),
    /// This caller created the pending marker and must compute
    Acquired,
}

// == Cache ==
/// Cache-aside engine over a shared store backend.
///
/// Holds one store handle per process plus a constructor-injected local
/// fallback cache for intentionally store-free call sites.
#[derive(Debug)]
pub struct Cache<S> {
    store: Arc<S>,
    local: LocalCache,
    config: CacheConfig,
}

impl Cache<RedisStore> {
    /// Creates an engine over Redis using environment configuration.
    pub fn from_env() -> Result<Self> {
        let config = CacheConfig::from_env();
        let store = RedisStore::new(&config.store_url, config.connect_retries)?;
        Ok(Self::with_config(store, config))
    }
}

impl Cache<MemoryStore> {
    /// Creates an engine over a process-local store, useful in tests and
    /// single-process deployments.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: StoreBackend + 'static> Cache<S> {
    /// Creates an engine with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, CacheConfig::default())
    }

    /// Creates an engine with explicit configuration.
    pub fn with_config(store: S, config: CacheConfig) -> Self {
        Self {
            store: Arc::new(store),
            local: LocalCache::new(),
            config,
        }
    }

    /// Direct access to the underlying store backend.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The process-local fallback cache.
    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    // == Resolve ==
    /// Returns the cached value for `key`, or runs `producer` and publishes
    /// its result.
    ///
    /// A TTL of 0 caches forever, until explicit invalidation. When caching is
    /// disabled globally or per call, the producer runs directly and the store
    /// is never touched. Failures follow the configured error policy: raised
    /// under `throw_on_error`, otherwise replaced by `default` when one is
    /// set.
    ///
    /// # Arguments
    /// * `key` - Non-empty cache key
    /// * `ttl_secs` - Entry lifetime in seconds, 0 = no expiry
    /// * `options` - Per-call flags, see [`ResolveOptions`]
    /// * `producer` - Zero-argument async computation producing the value
    pub async fn resolve<T, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        options: ResolveOptions<T>,
        producer: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("empty key".to_string()));
        }

        if self.config.no_cache || options.disabled {
            debug!(key, "cache disabled, invoking producer directly");
            return producer().await.map_err(CacheError::Producer);
        }

        let ResolveOptions {
            throw_on_error,
            timeout_ms,
            default,
            numeric_mode,
            ..
        } = options;

        match self
            .resolve_inner(key, ttl_secs, numeric_mode, timeout_ms, producer)
            .await
        {
            Ok(value) => Ok(value),
            Err(err) => {
                error!(key, error = %err, "cache resolve failed");
                if throw_on_error {
                    Err(err)
                } else if let Some(fallback) = default {
                    Ok(fallback)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn resolve_inner<T, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        mode: NumericMode,
        timeout_ms: Option<u64>,
        producer: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let deadline = Instant::now() + Duration::from_millis(WAIT_DEADLINE_MS);

        let probe = loop {
            if Instant::now() >= deadline {
                return Err(CacheError::Timeout(WAIT_DEADLINE_MS));
            }

            match self.store.get(key).await? {
                Some(entry) if entry == PENDING_MARKER => {
                    debug!(key, "waiting for in-flight computation");
                    sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
                Some(payload) => match codec::decode::<T>(&payload, mode) {
                    Ok(value) => {
                        debug!(key, "cache hit");
                        break Probe::Hit(value);
                    }
                    Err(err) => {
                        // Treat a corrupt entry as a miss: drop it and
                        // recompute on the next pass
                        warn!(key, error = %err, "malformed cache entry, recomputing");
                        let _ = self.store.delete(&[key.to_string()]).await;
                    }
                },
                None => {
                    // Single atomic transition: whoever newly creates the
                    // marker computes, everyone else polls
                    if self
                        .store
                        .set_nx_ex(key, PENDING_MARKER, BLOCK_TTL_SECS)
                        .await?
                    {
                        break Probe::Acquired;
                    }
                }
            }
        };

        match probe {
            Probe::Hit(value) => Ok(value),
            Probe::Acquired => {
                debug!(key, ttl_secs, "cache miss, computing");
                let fut = Self::execute_and_publish(
                    Arc::clone(&self.store),
                    key.to_string(),
                    ttl_secs,
                    producer(),
                );
                match timeout_ms {
                    Some(ms) => with_timeout(fut, ms).await,
                    None => fut.await,
                }
            }
        }
    }

    /// Runs the producer and publishes its result under `key`.
    ///
    /// Publish failures are logged, never raised: the caller still gets the
    /// computed value. A result that cannot be serialized reverts the key to
    /// absent instead of leaving the pending marker in place.
    async fn execute_and_publish<T, Fut>(
        store: Arc<S>,
        key: String,
        ttl_secs: u64,
        producing: Fut,
    ) -> Result<T>
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let value = producing.await.map_err(CacheError::Producer)?;

        match codec::encode(&value) {
            Some(payload) => {
                let write = if ttl_secs > 0 {
                    store.set_ex(&key, &payload, ttl_secs).await
                } else {
                    store.set(&key, &payload).await
                };
                if let Err(err) = write {
                    error!(key = %key, error = %err, "cache write failed");
                }
            }
            None => {
                if let Err(err) = store.delete(&[key.clone()]).await {
                    error!(key = %key, error = %err, "failed to clear pending marker");
                }
            }
        }

        Ok(value)
    }

    // == Refresh ==
    /// Recomputes the value for `key` and overwrites any cached entry,
    /// skipping the read path entirely.
    ///
    /// Follows the same error policy as [`Cache::resolve`].
    pub async fn refresh<T, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        options: ResolveOptions<T>,
        producer: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("empty key".to_string()));
        }

        if self.config.no_cache || options.disabled {
            return producer().await.map_err(CacheError::Producer);
        }

        debug!(key, ttl_secs, "refreshing cache entry");

        let fut =
            Self::execute_and_publish(Arc::clone(&self.store), key.to_string(), ttl_secs, producer());
        let result = match options.timeout_ms {
            Some(ms) => with_timeout(fut, ms).await,
            None => fut.await,
        };

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                error!(key, error = %err, "cache refresh failed");
                if options.throw_on_error {
                    Err(err)
                } else if let Some(fallback) = options.default {
                    Ok(fallback)
                } else {
                    Err(err)
                }
            }
        }
    }

    // == Local Resolve ==
    /// Memoizes through the process-local cache instead of the shared store.
    ///
    /// Intended for constrained environments where the shared store is
    /// bypassed intentionally. No cross-process coordination applies.
    pub async fn resolve_local<T, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        mode: NumericMode,
        producer: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("empty key".to_string()));
        }

        if let Some(value) = self.local.get(key, mode)? {
            debug!(key, "local cache hit");
            return Ok(value);
        }

        let value = producer().await.map_err(CacheError::Producer)?;
        self.local.insert(key, &value, ttl_secs);
        Ok(value)
    }

    // == Strict Accessors ==
    /// Reads and decodes the entry at `key`.
    ///
    /// An absent key, or one still holding the pending marker, fails with a
    /// missing-key error.
    pub async fn read<T: DeserializeOwned>(&self, key: &str, mode: NumericMode) -> Result<T> {
        match self.read_raw(key).await? {
            Some(payload) => codec::decode(&payload, mode),
            None => Err(CacheError::MissingKey(key.to_string())),
        }
    }

    /// Reads and decodes the entry at `key`, falling back to `default` when
    /// the key is absent.
    pub async fn read_or<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
        mode: NumericMode,
    ) -> Result<T> {
        match self.read_raw(key).await? {
            Some(payload) => codec::decode(&payload, mode),
            None => Ok(default),
        }
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("empty key".to_string()));
        }

        match self.store.get(key).await? {
            Some(entry) if entry == PENDING_MARKER => Ok(None),
            other => Ok(other),
        }
    }

    /// Writes a value under `key` with the given TTL (0 = no expiry).
    ///
    /// Values that cannot be serialized are skipped without error.
    pub async fn write<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("empty key".to_string()));
        }

        let Some(payload) = codec::encode(value) else {
            return Ok(());
        };

        if ttl_secs > 0 {
            self.store.set_ex(key, &payload, ttl_secs).await
        } else {
            self.store.set(key, &payload).await
        }
    }
}
