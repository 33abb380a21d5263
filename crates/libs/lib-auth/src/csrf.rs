//! # CSRF Guard
//!
//! Session-bound anti-forgery tokens. A token is minted per CSRF session id (the
//! `__SGCsrfSession` cookie) and stored as `csrf:<sid>`; re-issuing replaces it. Validation
//! compares the presented token with the stored one in constant time. A missing session,
//! missing token, expired token or mismatch is always a rejection.

use crate::error::AuthError;
use lib_core::SharedKv;
use subtle::ConstantTimeEq;

const CSRF_SESSION_LEN: usize = 32;
const CSRF_TOKEN_LEN: usize = 43;

fn csrf_key(sid: &str) -> String {
    format!("csrf:{sid}")
}

/// A freshly minted token and the CSRF session it is bound to.
#[derive(Debug, Clone)]
pub struct CsrfToken {
    pub session_id: String,
    pub token: String,
}

pub struct CsrfGuard {
    kv: SharedKv,
    ttl_secs: u64,
}

impl CsrfGuard {
    pub fn new(kv: SharedKv, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Mint a token for `session_id`, or for a new CSRF session when none is given.
    pub async fn issue(&self, session_id: Option<&str>) -> Result<CsrfToken, AuthError> {
        let session_id = match session_id.filter(|s| !s.is_empty()) {
            Some(sid) => sid.to_string(),
            None => lib_utils::random_key(CSRF_SESSION_LEN),
        };
        let token = lib_utils::random_key(CSRF_TOKEN_LEN);

        self.kv
            .set_ex(&csrf_key(&session_id), &token, self.ttl_secs)
            .await?;

        Ok(CsrfToken { session_id, token })
    }

    /// Check `presented` against the token stored for `session_id`.
    ///
    /// Store failures reject the request as well.
    pub async fn validate(&self, session_id: Option<&str>, presented: Option<&str>) -> Result<(), AuthError> {
        let (Some(sid), Some(presented)) = (
            session_id.filter(|s| !s.is_empty()),
            presented.filter(|s| !s.is_empty()),
        ) else {
            return Err(AuthError::CsrfMismatch);
        };

        let stored = match self.kv.get(&csrf_key(sid)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return Err(AuthError::CsrfMismatch),
            Err(e) => {
                tracing::error!(error = %e, "[CSRF] Token store unavailable, rejecting");
                return Err(AuthError::CsrfMismatch);
            }
        };

        if bool::from(stored.as_bytes().ct_eq(presented.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::CsrfMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_core::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn guard(ttl: u64) -> CsrfGuard {
        CsrfGuard::new(Arc::new(MemoryStore::new()), ttl)
    }

    #[tokio::test]
    async fn test_accepts_token_issued_to_own_session() {
        let guard = guard(60);
        let issued = guard.issue(None).await.unwrap();
        assert!(guard
            .validate(Some(&issued.session_id), Some(&issued.token))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_rejects_missing_token_or_session() {
        let guard = guard(60);
        let issued = guard.issue(None).await.unwrap();
        assert!(guard.validate(Some(&issued.session_id), None).await.is_err());
        assert!(guard.validate(Some(&issued.session_id), Some("")).await.is_err());
        assert!(guard.validate(None, Some(&issued.token)).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_token_from_other_session() {
        let guard = guard(60);
        let mine = guard.issue(None).await.unwrap();
        let theirs = guard.issue(None).await.unwrap();
        assert!(matches!(
            guard.validate(Some(&mine.session_id), Some(&theirs.token)).await,
            Err(AuthError::CsrfMismatch)
        ));
    }

    #[tokio::test]
    async fn test_reissue_replaces_previous_token() {
        let guard = guard(60);
        let first = guard.issue(None).await.unwrap();
        let second = guard.issue(Some(&first.session_id)).await.unwrap();
        assert_eq!(first.session_id, second.session_id);

        assert!(guard.validate(Some(&first.session_id), Some(&first.token)).await.is_err());
        assert!(guard.validate(Some(&first.session_id), Some(&second.token)).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_expired_token() {
        let guard = guard(1);
        let issued = guard.issue(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(guard
            .validate(Some(&issued.session_id), Some(&issued.token))
            .await
            .is_err());
    }
}
