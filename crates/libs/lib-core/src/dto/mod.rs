//! # Data Transfer Objects (DTOs)
//!
//! Structures exchanged with clients over the REST API and with other services over the
//! notification bus.

pub mod auth;
pub mod notify;
pub mod response;

pub use auth::*;
pub use notify::*;
pub use response::*;
