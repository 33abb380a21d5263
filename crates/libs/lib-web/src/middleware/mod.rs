//! # Middleware
//!
//! Axum middleware for request stamping, logging, guards and admin authentication.
//!
//! ## Modules
//!
//! - **[`mw_req_stamp`]**: Request ID, timestamp and client IP stamping
//! - **[`mw_logging`]**: Request/response logging with header redaction
//! - **[`mw_auth`]**: The CSRF / bearer / session / RBAC guard chain
//! - **[`mw_admin`]**: HTTP Basic authentication for the admin API
//! - **[`mw_rate_limit`]**: Fixed-window request budget per client IP

// region: --- Modules
pub mod mw_admin;
pub mod mw_auth;
pub mod mw_logging;
pub mod mw_rate_limit;
pub mod mw_req_stamp;
// endregion: --- Modules

// region: --- Re-exports
pub use mw_admin::require_admin;
pub use mw_auth::{authorize, require_auth, require_csrf, Guards};
pub use mw_logging::log_requests;
pub use mw_rate_limit::{rate_limit, RateLimiter};
pub use mw_req_stamp::{stamp_req, RequestStamp};
// endregion: --- Re-exports
