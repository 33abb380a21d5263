//! # Key-Value Store
//!
//! Short-lived shared state: refresh-token records, the blacklist, sessions, CSRF tokens,
//! captcha answers and single-login keys. Values are strings with a TTL in seconds.
//!
//! Two implementations:
//! - [`RedisStore`]: shared between gateway instances, externally synchronized.
//! - [`MemoryStore`]: in-process, used when `REDIS_URL` is unset and in tests.
//!
//! The store is injected (as [`SharedKv`]) into every service that needs it.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Shared handle to the configured key-value store.
pub type SharedKv = Arc<dyn KvStore>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the command failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set `key` to `value`, expiring after `ttl_secs` (minimum 1).
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Delete `key`. Returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Increment the counter at `key` and return its new value. The TTL is set only when
    /// the counter is created, so the key describes one fixed window.
    async fn incr_window(&self, key: &str, window_secs: u64) -> Result<i64, StoreError>;

    /// Delete `key` only if it currently holds `expected`, as a single atomic step.
    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}

/// Connect to Redis when a URL is configured, otherwise fall back to the in-process store.
pub async fn connect(redis_url: Option<&str>) -> Result<SharedKv, StoreError> {
    match redis_url {
        Some(url) => {
            let store = RedisStore::connect(url).await?;
            tracing::info!("[KV] Connected to Redis");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("[KV] REDIS_URL not set, using in-process store (single instance only)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
