//! # Utilities Library
//!
//! Shared helpers for base64, environment variables, time, validation and random keys.

pub mod b64;
pub mod envs;
pub mod keys;
pub mod time;
pub mod validation;

// Re-export commonly used functions
pub use b64::b64_decode_to_string;
pub use envs::{get_env, get_env_bool_or, get_env_or, get_env_parse_or};
pub use keys::{random_digits, random_key};
pub use time::{now_unix, parse_utc};
pub use validation::{validate_min_length, validate_not_empty};
