//! Redis Store Module
//!
//! Shared-store client owning a single lazily-constructed multiplexed
//! connection, reused process-wide. Construction is retried a bounded number
//! of times before surfacing a store-unavailable error.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

use crate::error::{CacheError, Result};
use crate::retry::retry;
use crate::store::StoreBackend;

// == Redis Store ==
/// Store backend over a Redis-compatible server.
pub struct RedisStore {
    client: redis::Client,
    conn: OnceCell<MultiplexedConnection>,
    connect_retries: u32,
}

impl RedisStore {
    /// Creates a store client for the given connection URL.
    ///
    /// No connection is opened yet; the multiplexed connection is established
    /// on first use and shared by every subsequent call.
    ///
    /// # Arguments
    /// * `url` - Connection URL, e.g. `redis://localhost:6379`
    /// * `connect_retries` - Extra connection attempts after the first failure
    pub fn new(url: &str, connect_retries: u32) -> Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            connect_retries,
        })
    }

    /// Returns the shared connection, establishing it on first access.
    ///
    /// The multiplexed connection is cheap to clone; each command works on its
    /// own clone of the one underlying handle.
    async fn conn(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                retry(
                    || self.client.get_multiplexed_async_connection(),
                    1 + self.connect_retries,
                )
                .await
                .map_err(|err| CacheError::StoreUnavailable(err.to_string()))
            })
            .await?;

        Ok(conn.clone())
    }
}

#[async_trait]
impl StoreBackend for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.conn().await?;

        // SET ... EX ... NX replies OK on creation and nil when the key
        // already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn().await?;
        let removed: u64 = conn.unlink(keys).await?;
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn mset(&self, entries: &[(String, String)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn().await?;
        let _: () = redis::cmd("MSET").arg(entries).query_async(&mut conn).await?;
        Ok(())
    }

    async fn expire_many(&self, keys: &[String], ttl_secs: u64) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn().await?;

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.expire(key, ttl_secs as i64).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
