//! # Authentication Errors
//!
//! `Display` carries the internal reason and is only ever logged. Clients see the fixed
//! message from [`AuthError::public_message`], so a caller cannot tell which check failed.

use lib_core::{AppError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token type mismatch")]
    WrongTokenType,

    #[error("token revoked or superseded")]
    Revoked,

    /// Revocation state could not be read; treated as revoked.
    #[error("revocation store unavailable: {0}")]
    RevocationUnavailable(String),

    #[error("session not found")]
    SessionNotFound,

    /// A newer login registered a different auth key for this account.
    #[error("session superseded by a newer login")]
    SessionSuperseded,

    #[error("csrf token missing or mismatched")]
    CsrfMismatch,

    #[error("captcha missing or mismatched")]
    CaptchaMismatch,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl AuthError {
    /// Client-facing message.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::SessionSuperseded => "you are logged in on another device",
            AuthError::CsrfMismatch => "invalid csrf token",
            AuthError::CaptchaMismatch => "invalid captcha",
            AuthError::Store(_) | AuthError::Encoding(_) => "An internal error occurred",
            _ => "Unauthorized",
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.public_message().to_string();
        match err {
            AuthError::CsrfMismatch => AppError::Forbidden(message),
            AuthError::Store(e) => AppError::Store(e.to_string()),
            AuthError::Encoding(e) => AppError::Internal(e),
            _ => AppError::Unauthorized(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_failures_share_one_message() {
        let failures = [
            AuthError::MissingCredentials,
            AuthError::InvalidToken("ExpiredSignature".to_string()),
            AuthError::WrongTokenType,
            AuthError::Revoked,
            AuthError::RevocationUnavailable("redis down".to_string()),
        ];
        for err in failures {
            let app: AppError = err.into();
            assert_eq!(app.status_code().as_u16(), 401);
            assert_eq!(app.user_message(), "Unauthorized");
        }
    }

    #[test]
    fn test_csrf_is_forbidden() {
        let app: AppError = AuthError::CsrfMismatch.into();
        assert_eq!(app.status_code().as_u16(), 403);
    }
}
