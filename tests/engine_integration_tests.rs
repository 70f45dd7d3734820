//! Integration Tests for the Cache Engine
//!
//! Exercises the coordinator, invalidation utilities, and error policies over
//! the in-memory store backend, plus an unreachable-store double for the
//! failure paths.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stampede_cache::{
    Cache, CacheError, MemoryStore, NumericMode, ResolveOptions, Result, StoreBackend,
};

// == Helper Functions ==

/// Installs the tracing subscriber once per test binary so engine logs show
/// up under `--nocapture`. Level defaults to debug, overridable via RUST_LOG.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stampede_cache=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn memory_cache() -> Cache<MemoryStore> {
    init_tracing();
    Cache::in_memory()
}

fn unreachable_cache() -> Cache<UnreachableStore> {
    init_tracing();
    Cache::new(UnreachableStore)
}

fn counting_producer(
    calls: Arc<AtomicU32>,
    value: f64,
) -> impl FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<f64>> + Send>>
{
    move || {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        })
    }
}

/// Store double standing in for an unreachable backend.
struct UnreachableStore;

#[async_trait]
impl StoreBackend for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }
    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }
    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }
    async fn set_nx_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<bool> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }
    async fn delete(&self, _keys: &[String]) -> Result<u64> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }
    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }
    async fn mset(&self, _entries: &[(String, String)]) -> Result<()> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }
    async fn expire_many(&self, _keys: &[String], _ttl_secs: u64) -> Result<()> {
        Err(CacheError::StoreUnavailable("connection refused".into()))
    }
}

// == Resolve Lifecycle Tests ==

#[tokio::test]
async fn test_hit_within_ttl_skips_producer() {
    let cache = memory_cache();
    let calls = Arc::new(AtomicU32::new(0));

    let v = cache
        .resolve(
            "price:X",
            300,
            ResolveOptions::default(),
            counting_producer(calls.clone(), 42.5),
        )
        .await
        .unwrap();
    assert_eq!(v, 42.5);

    let v = cache
        .resolve(
            "price:X",
            300,
            ResolveOptions::default(),
            counting_producer(calls.clone(), 99.9),
        )
        .await
        .unwrap();
    assert_eq!(v, 42.5);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expiry_reinvokes_producer() {
    let cache = memory_cache();
    let calls = Arc::new(AtomicU32::new(0));

    // Compressed version of the 300-second price scenario: fresh at t=0,
    // still fresh mid-TTL, recomputed after expiry.
    let v = cache
        .resolve(
            "price:X",
            2,
            ResolveOptions::default(),
            counting_producer(calls.clone(), 42.5),
        )
        .await
        .unwrap();
    assert_eq!(v, 42.5);

    sleep(Duration::from_millis(500)).await;
    let v = cache
        .resolve(
            "price:X",
            2,
            ResolveOptions::default(),
            counting_producer(calls.clone(), 99.9),
        )
        .await
        .unwrap();
    assert_eq!(v, 42.5);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    sleep(Duration::from_millis(1700)).await;
    let v = cache
        .resolve(
            "price:X",
            2,
            ResolveOptions::default(),
            counting_producer(calls.clone(), 99.9),
        )
        .await
        .unwrap();
    assert_eq!(v, 99.9);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_zero_ttl_caches_until_invalidation() {
    let cache = memory_cache();
    let calls = Arc::new(AtomicU32::new(0));

    cache
        .resolve("config", 0, ResolveOptions::default(), counting_producer(calls.clone(), 1.0))
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;
    let v = cache
        .resolve("config", 0, ResolveOptions::default(), counting_producer(calls.clone(), 2.0))
        .await
        .unwrap();
    assert_eq!(v, 1.0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    cache.invalidate(["config"]).await;
    let v = cache
        .resolve("config", 0, ResolveOptions::default(), counting_producer(calls.clone(), 2.0))
        .await
        .unwrap();
    assert_eq!(v, 2.0);
}

#[tokio::test]
async fn test_purge_then_resolve_always_reinvokes() {
    let cache = memory_cache();
    let calls = Arc::new(AtomicU32::new(0));

    cache
        .resolve("pools", 300, ResolveOptions::default(), counting_producer(calls.clone(), 1.0))
        .await
        .unwrap();

    cache.purge("pools").await;

    let v = cache
        .resolve("pools", 300, ResolveOptions::default(), counting_producer(calls.clone(), 2.0))
        .await
        .unwrap();
    assert_eq!(v, 2.0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// == Stampede Protection Tests ==

#[tokio::test]
async fn test_concurrent_resolves_execute_producer_once() {
    let cache = Arc::new(memory_cache());
    let calls = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cache
                .resolve("price:BTC", 300, ResolveOptions::default(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    // Slow producer keeps the pending marker observable
                    sleep(Duration::from_millis(150)).await;
                    Ok(42.5)
                })
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 42.5);
    }

    // The atomic marker acquisition admits exactly one producer run
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// == Disabled / Bypass Tests ==

#[tokio::test]
async fn test_disabled_resolves_bypass_store_every_time() {
    let cache = Arc::new(memory_cache());
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let options = ResolveOptions {
            disabled: true,
            ..Default::default()
        };
        let v = cache
            .resolve("price:X", 300, options, counting_producer(calls.clone(), 42.5))
            .await
            .unwrap();
        assert_eq!(v, 42.5);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(cache.store().is_empty().await);
}

#[tokio::test]
async fn test_disabled_resolve_works_with_unreachable_store() {
    let cache = unreachable_cache();

    let options = ResolveOptions {
        disabled: true,
        ..Default::default()
    };
    let v: f64 = cache
        .resolve("price:X", 300, options, || async { Ok(42.5) })
        .await
        .unwrap();
    assert_eq!(v, 42.5);
}

// == Numeric Mode Tests ==

#[tokio::test]
async fn test_lossless_and_standard_modes_diverge_on_big_integers() {
    let cache = memory_cache();
    let big = json!(9007199254740993u64);

    cache.write("supply", &big, 300).await.unwrap();

    let lossless: Value = cache.read("supply", NumericMode::Lossless).await.unwrap();
    let standard: Value = cache.read("supply", NumericMode::Standard).await.unwrap();

    // Lossless round-trips exactly; standard is permitted to lose precision
    // and must differ on this input.
    assert_eq!(lossless, big);
    assert_ne!(standard, big);
    assert_eq!(standard, json!(9007199254740992i64));
}

#[tokio::test]
async fn test_resolve_with_lossless_mode_round_trips() {
    let cache = memory_cache();

    let options = ResolveOptions {
        numeric_mode: NumericMode::Lossless,
        ..Default::default()
    };
    let v: u64 = cache
        .resolve("supply", 300, options, || async { Ok(9007199254740993u64) })
        .await
        .unwrap();
    assert_eq!(v, 9007199254740993u64);

    let options = ResolveOptions {
        numeric_mode: NumericMode::Lossless,
        ..Default::default()
    };
    let v: u64 = cache
        .resolve("supply", 300, options, || async {
            panic!("warm key must not recompute")
        })
        .await
        .unwrap();
    assert_eq!(v, 9007199254740993u64);
}

// == Error Policy Tests ==

#[tokio::test]
async fn test_failing_producer_returns_default() {
    let cache = memory_cache();

    let options = ResolveOptions {
        default: Some(0.0),
        ..Default::default()
    };
    let v: f64 = cache
        .resolve("price:X", 300, options, || async {
            Err(anyhow::anyhow!("upstream down"))
        })
        .await
        .unwrap();
    assert_eq!(v, 0.0);
}

#[tokio::test]
async fn test_failing_producer_raises_when_configured() {
    let cache = memory_cache();

    let options: ResolveOptions<f64> = ResolveOptions {
        throw_on_error: true,
        default: Some(0.0),
        ..Default::default()
    };
    let result = cache
        .resolve("price:X", 300, options, || async {
            Err(anyhow::anyhow!("upstream down"))
        })
        .await;
    assert!(matches!(result, Err(CacheError::Producer(_))));
}

#[tokio::test]
async fn test_unreachable_store_falls_back_to_default() {
    let cache = unreachable_cache();

    let options = ResolveOptions {
        default: Some(0.0),
        ..Default::default()
    };
    let v: f64 = cache
        .resolve("price:X", 300, options, || async { Ok(42.5) })
        .await
        .unwrap();
    assert_eq!(v, 0.0);
}

#[tokio::test]
async fn test_unreachable_store_raises_when_configured() {
    let cache = unreachable_cache();

    let options: ResolveOptions<f64> = ResolveOptions {
        throw_on_error: true,
        ..Default::default()
    };
    let result = cache
        .resolve("price:X", 300, options, || async { Ok(42.5) })
        .await;
    assert!(matches!(result, Err(CacheError::StoreUnavailable(_))));
}

// == Timeout Tests ==

#[tokio::test]
async fn test_slow_producer_times_out() {
    let cache = memory_cache();

    let options: ResolveOptions<f64> = ResolveOptions {
        throw_on_error: true,
        timeout_ms: Some(50),
        ..Default::default()
    };
    let result = cache
        .resolve("price:X", 300, options, || async {
            sleep(Duration::from_millis(500)).await;
            Ok(42.5)
        })
        .await;
    assert!(matches!(result, Err(CacheError::Timeout(50))));
}

#[tokio::test]
async fn test_timed_out_producer_still_publishes() {
    let cache = memory_cache();

    let options: ResolveOptions<f64> = ResolveOptions {
        throw_on_error: true,
        timeout_ms: Some(50),
        ..Default::default()
    };
    let result = cache
        .resolve("price:X", 300, options, || async {
            sleep(Duration::from_millis(200)).await;
            Ok(42.5)
        })
        .await;
    assert!(matches!(result, Err(CacheError::Timeout(_))));

    // The orphaned work keeps running and its write is not suppressed
    sleep(Duration::from_millis(400)).await;
    let v: f64 = cache.read("price:X", NumericMode::Standard).await.unwrap();
    assert_eq!(v, 42.5);
}

#[tokio::test]
async fn test_timeout_with_default_falls_back() {
    let cache = memory_cache();

    let options = ResolveOptions {
        timeout_ms: Some(50),
        default: Some(0.0),
        ..Default::default()
    };
    let v: f64 = cache
        .resolve("price:X", 300, options, || async {
            sleep(Duration::from_millis(500)).await;
            Ok(42.5)
        })
        .await
        .unwrap();
    assert_eq!(v, 0.0);
}

// == Invalidation Asymmetry Tests ==

#[tokio::test]
async fn test_clear_by_keyword_raises_on_unreachable_store() {
    let cache = unreachable_cache();

    let result = cache.clear_by_keyword("pool").await;
    assert!(matches!(result, Err(CacheError::StoreUnavailable(_))));
}

#[tokio::test]
async fn test_purge_swallows_unreachable_store() {
    let cache = unreachable_cache();

    // Best-effort: completes without raising
    cache.purge("pool").await;
    cache.purge_args("pool", &("BTC",)).await;
    cache.invalidate(["pool"]).await;
    cache.multi_set(&[("k".to_string(), 1.0)], 60).await;
}
