//! # Password Hashing
//!
//! Password hashing and verification using Argon2.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use std::sync::OnceLock;

pub const MIN_PASSWORD_LEN: usize = 8;

static DECOY_HASH: OnceLock<String> = OnceLock::new();

/// Hash a password using the Argon2 algorithm.
pub fn hash_password(password: &str) -> Result<String, String> {
    lib_utils::validate_min_length(password, MIN_PASSWORD_LEN, "Password")?;

    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| format!("Failed to hash password: {}", e))
}

/// Verify a plaintext password against a stored Argon2 hash.
///
/// An empty or unparsable stored hash never verifies (e.g. accounts without a password).
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Spend one Argon2 verification against a random hash. Unknown identities call this so they
/// cost the same as a wrong password.
pub fn verify_decoy(password: &str) {
    let hash = DECOY_HASH
        .get_or_init(|| hash_password(&lib_utils::random_key(32)).unwrap_or_default());
    let _ = verify_password(password, hash);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing() {
        let password = "TestPassword123!";
        let hash = hash_password(password)
            .expect("Password hashing should succeed for valid password");

        assert!(verify_password(password, &hash));
        assert!(!verify_password("WrongPassword", &hash));
    }

    #[test]
    fn test_password_too_short() {
        let result = hash_password("short");

        assert_eq!(
            result.expect_err("Hash should fail for short password"),
            "Password must be at least 8 characters"
        );
    }

    #[test]
    fn test_unusable_stored_hash_never_verifies() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_decoy_hash_is_argon2() {
        verify_decoy("TestPassword123!");
        assert!(DECOY_HASH.get().is_some_and(|h| h.starts_with("$argon2")));
    }
}
