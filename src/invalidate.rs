//! Invalidation Module
//!
//! Explicit cache invalidation: delete-by-key, delete-by-pattern, keyword
//! clearing, and bulk multi-set. All paths are best-effort and swallow store
//! errors, except keyword clearing which propagates them.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::codec;
use crate::coordinator::Cache;
use crate::error::Result;
use crate::key;
use crate::store::StoreBackend;

impl<S: StoreBackend + 'static> Cache<S> {
    // == Purge ==
    /// Deletes the exact key `prefix` and every key matching `prefix` as a
    /// glob pattern.
    ///
    /// Best-effort: store failures are logged, never raised.
    pub async fn purge(&self, prefix: &str) {
        let store = self.store();

        if let Err(err) = store.delete(&[prefix.to_string()]).await {
            warn!(prefix, error = %err, "failed to unlink exact key");
        }

        match store.keys(prefix).await {
            Ok(keys) if keys.is_empty() => {
                info!(prefix, "purge done, no pattern matches");
            }
            Ok(keys) => {
                info!(prefix, count = keys.len(), "unlinking matched keys");
                match store.delete(&keys).await {
                    Ok(removed) => info!(prefix, removed, "purge done"),
                    Err(err) => warn!(prefix, error = %err, "failed to unlink matched keys"),
                }
            }
            Err(err) => {
                warn!(prefix, error = %err, "failed to list keys for purge");
            }
        }
    }

    /// Deletes the exact entry derived from `prefix` and `args`.
    ///
    /// Best-effort, like [`Cache::purge`].
    pub async fn purge_args<A: Serialize>(&self, prefix: &str, args: &A) {
        let derived = match key::derive_key(prefix, args) {
            Ok(derived) => derived,
            Err(err) => {
                warn!(prefix, error = %err, "failed to derive key for purge");
                return;
            }
        };

        match self.store().delete(&[derived.clone()]).await {
            Ok(_) => info!(key = %derived, "purge done"),
            Err(err) => warn!(key = %derived, error = %err, "failed to unlink key"),
        }
    }

    // == Invalidate ==
    /// Deletes one or many exact keys.
    ///
    /// Best-effort: failures are logged, never raised.
    pub async fn invalidate<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return;
        }

        if let Err(err) = self.store().delete(&keys).await {
            warn!(count = keys.len(), error = %err, "failed to invalidate keys");
        }
    }

    // == Multi Set ==
    /// Writes many key/value pairs in one batch, then applies a uniform TTL
    /// (0 = no expiry) in a second batch step.
    ///
    /// On failure the whole batch is deleted as best-effort compensation; no
    /// partial group survives. Store errors are logged, never raised.
    pub async fn multi_set<T: Serialize>(&self, entries: &[(String, T)], ttl_secs: u64) {
        let batch: Vec<(String, String)> = entries
            .iter()
            .filter_map(|(k, v)| codec::encode(v).map(|payload| (k.clone(), payload)))
            .collect();

        if batch.is_empty() {
            return;
        }

        let keys: Vec<String> = batch.iter().map(|(k, _)| k.clone()).collect();

        let written = async {
            self.store().mset(&batch).await?;
            if ttl_secs > 0 {
                self.store().expire_many(&keys, ttl_secs).await?;
            }
            Result::Ok(())
        }
        .await;

        if let Err(err) = written {
            error!(count = keys.len(), error = %err, "multi-set failed, rolling back");
            if let Err(err) = self.store().delete(&keys).await {
                error!(error = %err, "multi-set rollback failed");
            }
        }
    }

    // == Clear By Keyword ==
    /// Deletes every key containing `keyword` as a substring, returning the
    /// count deleted.
    ///
    /// Unlike the other invalidation paths this propagates store errors, so
    /// callers can distinguish "nothing matched" from "store unreachable".
    pub async fn clear_by_keyword(&self, keyword: &str) -> Result<u64> {
        let pattern = format!("*{}*", keyword);
        let keys = self.store().keys(&pattern).await?;

        if keys.is_empty() {
            info!(keyword, "no keys found for keyword");
            return Ok(0);
        }

        let removed = self.store().delete(&keys).await?;
        info!(keyword, removed, "cleared keys by keyword");
        Ok(removed)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NumericMode;
    use crate::error::CacheError;

    #[tokio::test]
    async fn test_purge_exact_and_pattern() {
        let cache = Cache::in_memory();

        cache.write("pools", &1u32, 0).await.unwrap();
        cache.write("pools_1", &2u32, 0).await.unwrap();
        cache.write("pools_2", &3u32, 0).await.unwrap();
        cache.write("prices", &4u32, 0).await.unwrap();

        cache.purge("pools*").await;

        // "pools*" removes the pattern matches; "prices" survives
        assert!(cache.read::<u32>("pools_1", NumericMode::Standard).await.is_err());
        assert!(cache.read::<u32>("pools_2", NumericMode::Standard).await.is_err());
        let survivor: u32 = cache.read("prices", NumericMode::Standard).await.unwrap();
        assert_eq!(survivor, 4);
    }

    #[tokio::test]
    async fn test_purge_args_removes_derived_key() {
        let cache = Cache::in_memory();

        let derived = key::derive_key("price", &("BTC",)).unwrap();
        cache.write(&derived, &42.5, 0).await.unwrap();

        cache.purge_args("price", &("BTC",)).await;
        assert!(cache.read::<f64>(&derived, NumericMode::Standard).await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_single_and_many() {
        let cache = Cache::in_memory();

        cache.write("k1", &1u32, 0).await.unwrap();
        cache.write("k2", &2u32, 0).await.unwrap();

        cache.invalidate(["k1"]).await;
        assert!(cache.read::<u32>("k1", NumericMode::Standard).await.is_err());

        cache.invalidate(vec!["k2".to_string(), "absent".to_string()]).await;
        assert!(cache.read::<u32>("k2", NumericMode::Standard).await.is_err());
    }

    #[tokio::test]
    async fn test_multi_set_applies_uniform_ttl() {
        let cache = Cache::in_memory();

        let entries = vec![
            ("price_BTC".to_string(), 42.5),
            ("price_ETH".to_string(), 1800.0),
        ];
        cache.multi_set(&entries, 300).await;

        let btc: f64 = cache.read("price_BTC", NumericMode::Standard).await.unwrap();
        let eth: f64 = cache.read("price_ETH", NumericMode::Standard).await.unwrap();
        assert_eq!(btc, 42.5);
        assert_eq!(eth, 1800.0);
    }

    #[tokio::test]
    async fn test_clear_by_keyword_counts() {
        let cache = Cache::in_memory();

        cache.write("top_pools_daily", &1u32, 0).await.unwrap();
        cache.write("pools_hourly", &2u32, 0).await.unwrap();
        cache.write("prices", &3u32, 0).await.unwrap();

        let removed = cache.clear_by_keyword("pool").await.unwrap();
        assert_eq!(removed, 2);

        let removed = cache.clear_by_keyword("pool").await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_clear_by_keyword_missing_is_zero_not_error() {
        let cache = Cache::in_memory();
        let removed = cache.clear_by_keyword("nothing").await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_purge_then_resolve_reinvokes_producer() {
        let cache = Cache::in_memory();

        let value: u32 = cache
            .resolve("pools", 300, Default::default(), || async { Ok(1) })
            .await
            .unwrap();
        assert_eq!(value, 1);

        cache.purge("pools").await;

        let value: u32 = cache
            .resolve("pools", 300, Default::default(), || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_multi_set_skips_unserializable_entries() {
        let cache = Cache::in_memory();

        // f64::NAN has no JSON representation; the entry is dropped while the
        // rest of the batch still lands
        let entries = vec![("good".to_string(), 1.0), ("bad".to_string(), f64::NAN)];
        cache.multi_set(&entries, 0).await;

        let good: f64 = cache.read("good", NumericMode::Standard).await.unwrap();
        assert_eq!(good, 1.0);
        let missing: Result<f64> = cache.read("bad", NumericMode::Standard).await;
        assert!(matches!(missing, Err(CacheError::MissingKey(_))));
    }
}
