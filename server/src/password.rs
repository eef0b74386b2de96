//! Password hashing and verification (Argon2id).
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$...`), so the salt and
//! the cost parameters travel with the hash.
//!
//! # Invariants
//! - Passwords shorter than [`MIN_PASSWORD_LEN`] characters are never hashed.
//! - A missing hash never matches any password.
//! - Checking a password against no account costs one Argon2 verification,
//!   like checking it against a real one.

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::{Error, Result};
use crate::identity::random::rand_alnum;

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash of a random password nobody knows.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password(&rand_alnum(32)).ok());

/// Hash a password.
///
/// # Errors
/// - `InvalidInput` (code `weak_password`) if the password is too short.
/// - `InternalIssue` if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::invalid_input()
            .coded("weak_password")
            .hint("password is not strong enough"));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::internal().hint(format!("failed to hash password: {e}")))
}

/// Check a password against a stored hash.
///
/// Returns false when there is no hash or the stored hash cannot be parsed.
#[must_use]
pub fn check_password(hash: Option<&str>, password: &str) -> bool {
    let Some(hash) = hash else {
        return false;
    };

    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is not valid: {e}");
            false
        }
    }
}

/// [`hash_password`] on the blocking pool.
///
/// # Errors
/// Same as [`hash_password`].
pub async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| Error::internal().caused_by(e))?
}

/// [`check_password`] on the blocking pool.
pub async fn check_password_blocking(hash: Option<String>, password: String) -> bool {
    tokio::task::spawn_blocking(move || check_password(hash.as_deref(), &password))
        .await
        .unwrap_or(false)
}

/// Verify `password` against a hash that never matches, taking as long as
/// a real check. Used when the account does not exist.
pub async fn check_password_against_nothing(password: String) {
    let checked = tokio::task::spawn_blocking(move || {
        check_password(DUMMY_HASH.as_deref(), &password)
    })
    .await;
    debug_assert!(!checked.unwrap_or(false));
}
