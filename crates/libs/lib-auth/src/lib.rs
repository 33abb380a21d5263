//! # Authentication Library
//!
//! Identity pipeline building blocks: password hashing, the JWT access/refresh lifecycle,
//! server-side sessions with single-login enforcement, CSRF tokens and captcha challenges.
//!
//! Every stateful service takes the key-value store as an explicit dependency
//! ([`lib_core::SharedKv`]).

pub mod captcha;
pub mod cookies;
pub mod csrf;
pub mod error;
pub mod pwd;
pub mod session;
pub mod token;

// Re-export commonly used types
pub use captcha::{CaptchaChallenge, CaptchaService};
pub use csrf::{CsrfGuard, CsrfToken};
pub use error::AuthError;
pub use pwd::{hash_password, verify_decoy, verify_password};
pub use session::{SessionRecord, SessionStore, SingleLoginRegistry};
pub use token::{Claims, TokenKind, TokenPair, TokenService};
