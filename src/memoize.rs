//! Memoization Module
//!
//! Wraps a producer function with a key prefix and configuration so call
//! sites get transparent cache-aside behavior: derive a key from the
//! arguments, then resolve through the shared store or the process-local
//! fallback.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::NumericMode;
use crate::coordinator::{Cache, ResolveOptions};
use crate::error::Result;
use crate::key;
use crate::store::StoreBackend;

type KeyFn<A> = Box<dyn Fn(&A) -> String + Send + Sync>;

// == Memo Options ==
/// Configuration for a memoized function. Stateless beyond these fields; a
/// `Memoized` value is safe to invoke concurrently.
#[derive(Debug)]
pub struct MemoOptions<T> {
    /// Entry lifetime in seconds, 0 = cache until explicit invalidation
    pub ttl_secs: u64,
    /// Skip caching entirely and always invoke the producer
    pub disabled: bool,
    /// Use the process-local fallback cache instead of the shared store
    pub local: bool,
    /// Surface failures instead of falling back to `default`
    pub throw_on_error: bool,
    /// Optional producer deadline in milliseconds
    pub timeout_ms: Option<u64>,
    /// Value returned on failure when `throw_on_error` is unset
    pub default: Option<T>,
    /// Numeric handling for decoded entries
    pub numeric_mode: NumericMode,
}

impl<T> Default for MemoOptions<T> {
    fn default() -> Self {
        Self {
            ttl_secs: 0,
            disabled: false,
            local: false,
            throw_on_error: false,
            timeout_ms: None,
            default: None,
            numeric_mode: NumericMode::Standard,
        }
    }
}

// == Memoized Function ==
/// A producer function paired with a key prefix and cache configuration.
pub struct Memoized<S, A, T, F> {
    cache: Arc<Cache<S>>,
    prefix: String,
    producer: F,
    options: MemoOptions<T>,
    key_fn: Option<KeyFn<A>>,
    _marker: PhantomData<fn(A) -> T>,
}

impl<S, A, T, F> Memoized<S, A, T, F> {
    /// Wraps `producer` under the given key prefix with default options.
    pub fn new(cache: Arc<Cache<S>>, prefix: impl Into<String>, producer: F) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            producer,
            options: MemoOptions::default(),
            key_fn: None,
            _marker: PhantomData,
        }
    }

    /// Replaces the full option set.
    pub fn with_options(mut self, options: MemoOptions<T>) -> Self {
        self.options = options;
        self
    }

    /// Sets the entry TTL in seconds.
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.options.ttl_secs = ttl_secs;
        self
    }

    /// Overrides argument serialization with a caller-supplied key function.
    pub fn with_key_fn(mut self, key_fn: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Some(Box::new(key_fn));
        self
    }
}

impl<S, A, T, F> Memoized<S, A, T, F>
where
    S: StoreBackend + 'static,
    A: Serialize,
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    /// Invokes the memoized function.
    ///
    /// The cache key is the prefix joined with either the key function's
    /// output or the canonical serialization of `args`.
    pub async fn call<Fut>(&self, args: A) -> Result<T>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let cache_key = self.derive(&args)?;

        if self.options.local {
            return self
                .cache
                .resolve_local(
                    &cache_key,
                    self.options.ttl_secs,
                    self.options.numeric_mode,
                    || (self.producer)(args),
                )
                .await;
        }

        self.cache
            .resolve(
                &cache_key,
                self.options.ttl_secs,
                self.resolve_options(),
                || (self.producer)(args),
            )
            .await
    }

    /// Recomputes and overwrites the entry for `args`, skipping the read
    /// path.
    pub async fn refresh<Fut>(&self, args: A) -> Result<T>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let cache_key = self.derive(&args)?;

        if self.options.local {
            let value = (self.producer)(args).await?;
            self.cache.local().insert(&cache_key, &value, self.options.ttl_secs);
            return Ok(value);
        }

        self.cache
            .refresh(
                &cache_key,
                self.options.ttl_secs,
                self.resolve_options(),
                || (self.producer)(args),
            )
            .await
    }

    fn derive(&self, args: &A) -> Result<String> {
        match &self.key_fn {
            Some(key_fn) => Ok(format!("{}_{}", self.prefix, key_fn(args))),
            None => key::derive_key(&self.prefix, args),
        }
    }

    fn resolve_options(&self) -> ResolveOptions<T> {
        ResolveOptions {
            disabled: self.options.disabled,
            throw_on_error: self.options.throw_on_error,
            timeout_ms: self.options.timeout_ms,
            default: self.options.default.clone(),
            numeric_mode: self.options.numeric_mode,
        }
    }
}
