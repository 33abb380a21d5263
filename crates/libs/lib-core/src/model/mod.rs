//! # Model Layer
//!
//! - [`kv`]: key-value store for revocation, sessions, CSRF, captcha and single-login keys.
//! - [`store`]: SQLite pool and repositories (accounts, telemetry rows).

pub mod kv;
pub mod store;
