//! # Token Service
//!
//! HS512 access/refresh token lifecycle.
//!
//! - **Access** tokens carry the identity subset needed for authorization. No server state.
//! - **Refresh** tokens carry the full identity and a fresh `jti`. Issuing one overwrites
//!   `refresh:<account>` with that `jti`, so any earlier refresh token of the account is stale.
//! - **Revocation** writes `blacklist:<jti>` with a TTL equal to the token's remaining lifetime.
//!
//! Refresh verification reads the store and fails closed: if the blacklist or the active
//! record cannot be read, the token is rejected.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use lib_auth::token::{TokenKind, TokenService};
//! # use lib_core::{dto::UserData, MemoryStore};
//! # use std::sync::Arc;
//! # async fn example(user: UserData) -> Result<(), lib_auth::AuthError> {
//! let tokens = TokenService::new("a-secret-of-at-least-32-characters!!", 3600, 86400,
//!     Arc::new(MemoryStore::new()));
//! let pair = tokens.issue_pair(&user).await?;
//! let principal = tokens.verify(&pair.access_token, TokenKind::Access).await?;
//! let (_, rotated) = tokens.rotate(&pair.refresh_token).await?;
//! # Ok(())
//! # }
//! ```

mod claims;


pub use claims::{Claims, TokenKind};

use crate::error::AuthError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use lib_core::dto::UserData;
use lib_core::{Config, SharedKv};

/// Access + refresh tokens minted together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub fn refresh_key(id_account: &str) -> String {
    format!("refresh:{id_account}")
}

pub fn blacklist_key(jti: &str) -> String {
    format!("blacklist:{jti}")
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    kv: SharedKv,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64, kv: SharedKv) -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl_secs,
            refresh_ttl_secs,
            kv,
        }
    }

    pub fn from_config(config: &Config, kv: SharedKv) -> Self {
        Self::new(
            &config.jwt_secret,
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
            kv,
        )
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    // region: --- Issue

    /// Mint a token of `kind` for `principal`.
    ///
    /// A refresh token overwrites the account's active refresh record.
    pub async fn issue(&self, principal: &UserData, kind: TokenKind) -> Result<String, AuthError> {
        let now = lib_utils::now_unix();

        match kind {
            TokenKind::Access => {
                let claims = Claims::access(principal, now, now + self.access_ttl_secs);
                self.sign(&claims)
            }
            TokenKind::Refresh => {
                let jti = uuid::Uuid::new_v4().to_string();
                let claims = Claims::refresh(principal, now, now + self.refresh_ttl_secs, jti.clone());
                let token = self.sign(&claims)?;

                self.kv
                    .set_ex(
                        &refresh_key(&principal.id_account),
                        &jti,
                        self.refresh_ttl_secs.max(1) as u64,
                    )
                    .await?;

                Ok(token)
            }
        }
    }

    pub async fn issue_pair(&self, principal: &UserData) -> Result<TokenPair, AuthError> {
        let refresh_token = self.issue(principal, TokenKind::Refresh).await?;
        let access_token = self.issue(principal, TokenKind::Access).await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS512), claims, &self.encoding)
            .map_err(|e| AuthError::Encoding(e.to_string()))
    }

    // endregion: --- Issue

    // region: --- Verify

    /// Verify signature, expiry and `typ`; for refresh tokens also the revocation state.
    pub async fn verify(&self, token: &str, expected: TokenKind) -> Result<UserData, AuthError> {
        self.verify_claims(token, expected)
            .await
            .map(Claims::into_principal)
    }

    async fn verify_claims(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.decode_claims(token, expected)?;

        if expected == TokenKind::Refresh {
            let jti = claims.jti.as_deref().ok_or(AuthError::Revoked)?;

            if self.is_revoked(jti).await? {
                return Err(AuthError::Revoked);
            }

            let active = self
                .kv
                .get(&refresh_key(&claims.id_account))
                .await
                .map_err(|e| AuthError::RevocationUnavailable(e.to_string()))?;
            if active.as_deref() != Some(jti) {
                return Err(AuthError::Revoked);
            }
        }

        Ok(claims)
    }

    /// Signature, expiry and `typ` only.
    fn decode_claims(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;

        if !claims.is_kind(expected) {
            return Err(AuthError::WrongTokenType);
        }
        if claims.id_account.is_empty() {
            return Err(AuthError::InvalidToken("empty subject".to_string()));
        }

        Ok(claims)
    }

    // endregion: --- Verify

    // region: --- Revocation

    /// Blacklist `jti` until `exp` (unix seconds), at least one second.
    pub async fn revoke(&self, jti: &str, exp: i64) -> Result<(), AuthError> {
        let remaining = (exp - lib_utils::now_unix()).max(1) as u64;
        self.kv.set_ex(&blacklist_key(jti), "1", remaining).await?;
        tracing::debug!(jti, remaining, "[AUTH] Token revoked");
        Ok(())
    }

    /// Whether `jti` is blacklisted. A store failure is an error, never `false`.
    pub async fn is_revoked(&self, jti: &str) -> Result<bool, AuthError> {
        self.kv
            .exists(&blacklist_key(jti))
            .await
            .map_err(|e| AuthError::RevocationUnavailable(e.to_string()))
    }

    /// Exchange a refresh token for a brand-new pair. The old record is deleted and the old
    /// `jti` blacklisted, so the presented token cannot be replayed.
    ///
    /// The record is removed with a compare-and-delete on the presented `jti`; of two
    /// concurrent rotations of the same token only the one that removes it proceeds.
    pub async fn rotate(&self, refresh_token: &str) -> Result<(UserData, TokenPair), AuthError> {
        let claims = self.verify_claims(refresh_token, TokenKind::Refresh).await?;
        let exp = claims.exp;
        let mut principal = claims.into_principal();
        let old_jti = principal.jti.take().unwrap_or_default();

        let claimed = self
            .kv
            .del_if_eq(&refresh_key(&principal.id_account), &old_jti)
            .await
            .map_err(|e| AuthError::RevocationUnavailable(e.to_string()))?;
        if !claimed {
            return Err(AuthError::Revoked);
        }
        self.revoke(&old_jti, exp).await?;

        let pair = self.issue_pair(&principal).await?;
        tracing::info!(account = %principal.id_account, "[AUTH] Refresh token rotated");
        Ok((principal, pair))
    }

    /// Blacklist a presented refresh token and clear the account's record if it is the active one.
    ///
    /// Only signature and `typ` are checked, so stale tokens can still be blacklisted.
    pub async fn logout(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.decode_claims(refresh_token, TokenKind::Refresh)?;
        let jti = claims.jti.clone().ok_or(AuthError::Revoked)?;

        self.revoke(&jti, claims.exp).await?;

        self.kv.del_if_eq(&refresh_key(&claims.id_account), &jti).await?;

        Ok(claims.id_account)
    }

    /// Drop the account's active refresh record, invalidating its current refresh token.
    pub async fn revoke_account(&self, id_account: &str) -> Result<(), AuthError> {
        self.kv.del(&refresh_key(id_account)).await?;
        Ok(())
    }

    // endregion: --- Revocation
}
