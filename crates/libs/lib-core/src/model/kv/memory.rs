//! In-process [`KvStore`]. Expired keys are dropped lazily on access.

use super::{KvStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs.max(1));
        self.lock()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let removed = self.lock().remove(key);
        Ok(matches!(removed, Some((_, expires_at)) if expires_at > Instant::now()))
    }

    async fn incr_window(&self, key: &str, window_secs: u64) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock();
        let (count, expires_at) = match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => {
                let current: i64 = value
                    .parse()
                    .map_err(|_| StoreError::Serialization(format!("{key} is not a counter")))?;
                (current + 1, *expires_at)
            }
            _ => (1, now + Duration::from_secs(window_secs.max(1))),
        };
        entries.insert(key.to_string(), (count.to_string(), expires_at));
        Ok(count)
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() && value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let store = MemoryStore::new();
        store.set_ex("refresh:1", "jti-a", 60).await.unwrap();
        assert_eq!(store.get("refresh:1").await.unwrap().as_deref(), Some("jti-a"));
        assert!(store.exists("refresh:1").await.unwrap());

        assert!(store.del("refresh:1").await.unwrap());
        assert!(!store.del("refresh:1").await.unwrap());
        assert_eq!(store.get("refresh:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_window_counts_until_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_window("rate:1.2.3.4", 1).await.unwrap(), 1);
        assert_eq!(store.incr_window("rate:1.2.3.4", 1).await.unwrap(), 2);
        assert_eq!(store.incr_window("rate:1.2.3.4", 1).await.unwrap(), 3);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.incr_window("rate:1.2.3.4", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_del_if_eq_only_removes_matching_value() {
        let store = MemoryStore::new();
        store.set_ex("refresh:1", "jti-a", 60).await.unwrap();

        assert!(!store.del_if_eq("refresh:1", "jti-b").await.unwrap());
        assert!(store.exists("refresh:1").await.unwrap());

        assert!(store.del_if_eq("refresh:1", "jti-a").await.unwrap());
        assert!(!store.del_if_eq("refresh:1", "jti-a").await.unwrap());
        assert!(!store.exists("refresh:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store.set_ex("blacklist:x", "1", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!store.exists("blacklist:x").await.unwrap());
    }
}
