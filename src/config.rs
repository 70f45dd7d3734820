//! Configuration Module
//!
//! Handles loading and managing cache engine configuration from environment variables.

use std::env;

/// Cache engine configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Connection URL for the shared key-value store
    pub store_url: String,
    /// Bypass the shared store entirely and always invoke producers directly
    pub no_cache: bool,
    /// Extra connection attempts after the first failure
    pub connect_retries: u32,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_URL` - Store connection URL (default: redis://localhost:6379)
    /// - `NO_CACHE` - When set to a non-empty value, disables caching globally
    /// - `CACHE_CONNECT_RETRIES` - Connection retry budget (default: 1)
    pub fn from_env() -> Self {
        Self {
            store_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            no_cache: env::var("NO_CACHE").map(|v| !v.is_empty()).unwrap_or(false),
            connect_retries: env::var("CACHE_CONNECT_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_url: "redis://localhost:6379".to_string(),
            no_cache: false,
            connect_retries: 1,
        }
    }
}
