//! # HTTP Request Handlers
//!
//! Endpoints served by the gateway itself. Everything else falls through to the
//! [`crate::proxy::dispatch`] fallback.
//!
//! ## Handler Modules
//!
//! - **[`auth`]**: login, refresh, logout and session lookup
//!   - `POST /api/v1/auth/login` - Authenticate (CSRF-guarded)
//!   - `POST /api/v1/auth/refresh` - Rotate a refresh token
//!   - `GET /api/v1/auth/logout` - Revoke tokens, destroy session (bearer auth)
//!   - `GET /api/v1/auth/get-session` - Principal behind the access token (bearer auth)
//!   - `GET /api/v1/auth/session` - Cookie-bound session record
//!
//! - **[`csrf`]**: anti-forgery tokens
//!   - `GET /secure-gateway-c`, `GET /api/secure-gateway-c`
//!   - `GET /secure-gateway-c-cookie`
//!
//! - **[`captcha`]**: `GET /get-captcha`
//!
//! - **[`admin`]**: HTTP Basic protected
//!   - `GET|POST /config-file` - Read or replace the route document
//!   - `POST /publish` - Publish an email notification
//!
//! - **[`ops`]**: `GET /live`, `/metrics`, `/health/circuit`, `/metrics/circuit`, `/info`,
//!   `/log-stats-proxy`
//!
//! ## Error Handling
//!
//! Handlers return `Result<T, AppError>`; [`lib_core::AppError`] renders
//! `{"success": false, "code", "message"}` with a client-safe message.

pub mod admin;
pub mod auth;
pub mod captcha;
pub mod csrf;
pub mod ops;
