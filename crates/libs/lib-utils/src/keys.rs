//! # Random Keys
//!
//! Alphanumeric keys for session ids, per-login auth keys and CSRF tokens.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random alphanumeric key of `len` characters from the thread-local CSPRNG.
pub fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Pick a random integer in `low..=high`.
pub fn random_digits(low: i64, high: i64) -> i64 {
    rand::thread_rng().gen_range(low..=high)
}
