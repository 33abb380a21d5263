//! # Sessions and Single-Login
//!
//! Server-side sessions keyed by an opaque cookie value (`session:<sid>`), and the
//! single-login registry (`user-active-<account>`) holding the auth key of the newest login.
//!
//! A session is fresh when the account has no registered key, or when the registered key
//! equals the session's `auth_key`. A registry read failure is treated as not fresh.

use crate::error::AuthError;
use lib_core::dto::UserData;
use lib_core::SharedKv;
use serde::{Deserialize, Serialize};

const SESSION_ID_LEN: usize = 64;

fn session_key(sid: &str) -> String {
    format!("session:{sid}")
}

fn active_key(id_account: &str) -> String {
    format!("user-active-{id_account}")
}

// region: --- Session Store

/// Minimal identity mirrored from the last good login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id_account: String,
    pub auth_key: String,
    pub username: String,
    pub full_name: String,
    /// Status class at login time, so session-only routes can still apply RBAC.
    pub status_account: i64,
    pub created_at: i64,
}

impl SessionRecord {
    pub fn from_user(user: &UserData) -> Self {
        Self {
            id_account: user.id_account.clone(),
            auth_key: user.auth_key.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            status_account: user.status_account,
            created_at: lib_utils::now_unix(),
        }
    }

    pub fn to_principal(&self) -> UserData {
        UserData {
            id_account: self.id_account.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            status_account: self.status_account,
            auth_key: self.auth_key.clone(),
            ..Default::default()
        }
    }
}

pub struct SessionStore {
    kv: SharedKv,
    ttl_secs: u64,
}

impl SessionStore {
    pub fn new(kv: SharedKv, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Store a session for `user` and return its new id.
    pub async fn create(&self, user: &UserData) -> Result<String, AuthError> {
        let sid = lib_utils::random_key(SESSION_ID_LEN);
        let record = serde_json::to_string(&SessionRecord::from_user(user))
            .map_err(|e| AuthError::Store(e.into()))?;
        self.kv.set_ex(&session_key(&sid), &record, self.ttl_secs).await?;
        Ok(sid)
    }

    /// Destroy `previous` (if any) and create a fresh session, so a login never reuses an id.
    pub async fn regenerate(&self, previous: Option<&str>, user: &UserData) -> Result<String, AuthError> {
        if let Some(sid) = previous {
            self.destroy(sid).await?;
        }
        self.create(user).await
    }

    /// Load a session. A corrupt record reads as absent.
    pub async fn get(&self, sid: &str) -> Result<Option<SessionRecord>, AuthError> {
        if sid.is_empty() {
            return Ok(None);
        }
        let Some(raw) = self.kv.get(&session_key(sid)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(error = %e, "[SESSION] Discarding unreadable session record");
                Ok(None)
            }
        }
    }

    pub async fn destroy(&self, sid: &str) -> Result<(), AuthError> {
        self.kv.del(&session_key(sid)).await?;
        Ok(())
    }
}

// endregion: --- Session Store

// region: --- Single Login

pub struct SingleLoginRegistry {
    kv: SharedKv,
    ttl_secs: u64,
}

impl SingleLoginRegistry {
    pub fn new(kv: SharedKv, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    /// Make `auth_key` the only valid key for the account.
    pub async fn register(&self, id_account: &str, auth_key: &str) -> Result<(), AuthError> {
        self.kv
            .set_ex(&active_key(id_account), auth_key, self.ttl_secs)
            .await?;
        Ok(())
    }

    pub async fn current(&self, id_account: &str) -> Result<Option<String>, AuthError> {
        Ok(self.kv.get(&active_key(id_account)).await?)
    }

    pub async fn clear(&self, id_account: &str) -> Result<(), AuthError> {
        self.kv.del(&active_key(id_account)).await?;
        Ok(())
    }

    /// Reject a session whose auth key was superseded by a newer login.
    pub async fn ensure_fresh(&self, session: &SessionRecord) -> Result<(), AuthError> {
        match self.kv.get(&active_key(&session.id_account)).await {
            Ok(Some(active)) if active != session.auth_key => Err(AuthError::SessionSuperseded),
            Ok(_) => Ok(()),
            Err(e) => Err(AuthError::RevocationUnavailable(e.to_string())),
        }
    }
}

// endregion: --- Single Login

#[cfg(test)]
mod tests {
    use super::*;
    use lib_core::MemoryStore;
    use std::sync::Arc;

    fn user(auth_key: &str) -> UserData {
        UserData {
            id_account: "acc-1".to_string(),
            username: "alice".to_string(),
            full_name: "Alice A".to_string(),
            status_account: 10,
            auth_key: auth_key.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_session_create_get_destroy() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()), 60);
        let sid = store.create(&user("key-a")).await.unwrap();
        assert_eq!(sid.len(), SESSION_ID_LEN);

        let record = store.get(&sid).await.unwrap().unwrap();
        assert_eq!(record.auth_key, "key-a");
        assert_eq!(record.to_principal().status_account, 10);

        store.destroy(&sid).await.unwrap();
        assert!(store.get(&sid).await.unwrap().is_none());
        assert!(store.get("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_regenerate_drops_previous_session() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()), 60);
        let old = store.create(&user("key-a")).await.unwrap();
        let new = store.regenerate(Some(&old), &user("key-b")).await.unwrap();

        assert_ne!(old, new);
        assert!(store.get(&old).await.unwrap().is_none());
        assert_eq!(store.get(&new).await.unwrap().unwrap().auth_key, "key-b");
    }

    #[tokio::test]
    async fn test_login_elsewhere_supersedes_old_session() {
        let kv: SharedKv = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(kv.clone(), 60);
        let registry = SingleLoginRegistry::new(kv, 60);

        // Device A logs in.
        let sid_a = sessions.create(&user("key-a")).await.unwrap();
        registry.register("acc-1", "key-a").await.unwrap();
        let session_a = sessions.get(&sid_a).await.unwrap().unwrap();
        assert!(registry.ensure_fresh(&session_a).await.is_ok());

        // Device B logs in.
        let sid_b = sessions.create(&user("key-b")).await.unwrap();
        registry.register("acc-1", "key-b").await.unwrap();

        assert!(matches!(
            registry.ensure_fresh(&session_a).await,
            Err(AuthError::SessionSuperseded)
        ));
        let session_b = sessions.get(&sid_b).await.unwrap().unwrap();
        assert!(registry.ensure_fresh(&session_b).await.is_ok());
    }

    #[tokio::test]
    async fn test_unregistered_account_is_fresh() {
        let kv: SharedKv = Arc::new(MemoryStore::new());
        let registry = SingleLoginRegistry::new(kv, 60);
        let record = SessionRecord::from_user(&user("key-a"));
        assert!(registry.ensure_fresh(&record).await.is_ok());
    }
}
