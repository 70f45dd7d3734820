//! In-Memory Store Module
//!
//! Process-local implementation of the store contract. Used as the default
//! test backend and as a drop-in for environments without a shared store.
//! Entries expire lazily on read; there is no background sweep.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::StoreBackend;

// == Stored Entry ==
#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    expires_at: Option<u64>,
}

impl StoredEntry {
    fn new(value: String, ttl_secs: Option<u64>) -> Self {
        let expires_at = ttl_secs.map(|ttl| current_timestamp_ms() + ttl * 1000);
        Self { value, expires_at }
    }

    /// An entry is expired once the current time reaches its expiration time.
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }
}

/// Returns current Unix timestamp in milliseconds.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

// == Memory Store ==
/// In-memory key-value store with TTL support and glob key matching.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true when the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.write().await;

        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return Ok(None),
        };

        if expired {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), StoredEntry::new(value.to_string(), None));
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            StoredEntry::new(value.to_string(), Some(ttl_secs)),
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut entries = self.entries.write().await;

        // An expired entry counts as absent
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired() {
                return Ok(false);
            }
        }

        entries.insert(
            key.to_string(),
            StoredEntry::new(value.to_string(), Some(ttl_secs)),
        );
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.write().await;

        let mut removed = 0;
        for key in keys {
            if entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;

        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn mset(&self, batch: &[(String, String)]) -> Result<()> {
        let mut entries = self.entries.write().await;

        for (key, value) in batch {
            entries.insert(key.clone(), StoredEntry::new(value.clone(), None));
        }
        Ok(())
    }

    async fn expire_many(&self, keys: &[String], ttl_secs: u64) -> Result<()> {
        let mut entries = self.entries.write().await;

        let expires_at = current_timestamp_ms() + ttl_secs * 1000;
        for key in keys {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(expires_at);
            }
        }
        Ok(())
    }
}

// == Glob Matching ==
/// Minimal glob matcher supporting `*` (any run) and `?` (any single char),
/// the subset the KEYS command contract relies on.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();

    // Iterative matcher with single-star backtracking
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}
