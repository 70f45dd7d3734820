//! Process-Local Cache Module
//!
//! In-memory fallback cache used when the shared store is bypassed
//! intentionally, e.g. in constrained environments. Entries carry an expiry
//! timestamp checked lazily on read; there is no background sweep.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{self, NumericMode};
use crate::error::Result;

/// Default lifetime applied when no TTL is given: one year, effectively
/// "until the process restarts".
const DEFAULT_LOCAL_TTL_SECS: i64 = 365 * 24 * 60 * 60;

// == Local Entry ==
#[derive(Debug)]
struct LocalEntry {
    /// Encoded envelope payload
    payload: String,
    /// Unix timestamp (seconds) after which the entry is stale
    expires_at: i64,
}

// == Local Cache ==
/// Mutex-guarded process-local cache keyed like the shared store.
#[derive(Debug, Default)]
pub struct LocalCache {
    entries: Mutex<HashMap<String, LocalEntry>>,
}

impl LocalCache {
    /// Creates an empty local cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the decoded value for `key` if present and not expired.
    ///
    /// Expired entries are removed on read.
    pub fn get<T: DeserializeOwned>(&self, key: &str, mode: NumericMode) -> Result<Option<T>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let fresh = match entries.get(key) {
            Some(entry) => entry.expires_at > Utc::now().timestamp(),
            None => return Ok(None),
        };

        if !fresh {
            entries.remove(key);
            return Ok(None);
        }

        let entry = &entries[key];
        Ok(Some(codec::decode(&entry.payload, mode)?))
    }

    /// Stores a value under `key` with the given TTL in seconds.
    ///
    /// A TTL of 0 applies the one-year default. Values that fail to serialize
    /// are silently skipped, matching the shared-store write contract.
    pub fn insert<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Some(payload) = codec::encode(value) else {
            return;
        };

        let ttl = if ttl_secs == 0 {
            DEFAULT_LOCAL_TTL_SECS
        } else {
            ttl_secs as i64
        };

        let entry = LocalEntry {
            payload,
            expires_at: Utc::now().timestamp() + ttl,
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
    }

    /// Removes an entry, returning whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key).is_some()
    }

    /// Returns the current number of live and stale entries combined.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
