//! # Centralized Error Handling
//!
//! This module defines the gateway-wide error type [`AppError`] that every handler and guard
//! translates into at the HTTP boundary. It follows the `thiserror` pattern for ergonomic error
//! handling.
//!
//! ## Error Categories
//!
//! 1. **Client Errors** (4xx)
//!    - [`InvalidInput`](AppError::InvalidInput) → 400 Bad Request (field-level detail allowed)
//!    - [`Unauthorized`](AppError::Unauthorized) → 401 (message is always a public, generic one)
//!    - [`Forbidden`](AppError::Forbidden) → 403 (CSRF mismatch, RBAC denial)
//!    - [`NotFound`](AppError::NotFound) → 404
//!    - [`Unprocessable`](AppError::Unprocessable) → 422
//!
//! 2. **Server Errors** (5xx)
//!    - [`Upstream`](AppError::Upstream) → 502, rendered as "upstream unavailable"
//!    - [`Config`](AppError::Config), [`Store`](AppError::Store),
//!      [`Internal`](AppError::Internal) → 500
//!
//! ## Wire Format
//!
//! ```text
//! {"success": false, "code": 401, "message": "Unauthorized"}
//! ```
//!
//! The full error (including internal detail) is logged, never sent to the client.

use crate::model::kv::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Convenience type alias for `Result<T, AppError>`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Gateway-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error during startup, environment loading or route document validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request body or parameters.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Missing, invalid, expired, wrong-type or revoked credentials.
    ///
    /// The payload is the public message; callers never put the failing check in it.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// CSRF mismatch or RBAC denial.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Semantically invalid request (e.g. `httponly` login without `domain`).
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Client exceeded its request budget for the current window.
    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    /// Connection failure, deadline exceeded or open circuit while forwarding.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Key-value store or database failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Internal server error (unexpected failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Store(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a client-safe error message.
    ///
    /// For upstream and internal errors, returns a fixed message to avoid exposing details.
    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Unprocessable(msg)
            | AppError::TooManyRequests(msg) => msg.clone(),
            AppError::Upstream(_) => "upstream unavailable".to_string(),
            AppError::Config(_) | AppError::Store(_) | AppError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

/// Implement Axum's `IntoResponse` for automatic error handling.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.user_message();

        match status {
            StatusCode::BAD_GATEWAY | StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("Server error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = Json(json!({
            "success": false,
            "code": status.as_u16(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Convert `sqlx::Error` to `AppError`.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Database record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                AppError::Store(format!("Database error: {}", db_err.message()))
            }
            _ => AppError::Store(format!("Database error: {}", err)),
        }
    }
}

/// Convert `serde_json::Error` to `AppError`.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON error: {}", err))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err.to_string())
    }
}

impl From<crate::routes::ConfigError> for AppError {
    fn from(err: crate::routes::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
