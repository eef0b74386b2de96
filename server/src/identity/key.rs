//! Login keys.
//!
//! A login key is a `"<kind>/<value>"` string that resolves to exactly one
//! user. The kinds `id`, `email` and `username` are derived from the user
//! record itself; every other kind (a provider name such as `github`) is
//! stored as a row of its own.
//!
//! # Invariants
//! - Splitting happens on the first separator only, so values may contain `/`.
//! - A key belongs to exactly one user and is never mutated after creation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between the kind and the value of a login key.
pub const KEY_SEPARATOR: char = '/';

/// Key kind resolving a user by id.
pub const KEY_KIND_ID: &str = "id";
/// Key kind resolving a user by email address.
pub const KEY_KIND_EMAIL: &str = "email";
/// Key kind resolving a user by username.
pub const KEY_KIND_USERNAME: &str = "username";

#[allow(clippy::expect_used)]
static KEY_KIND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]+$").expect("key kind pattern compiles"));

/// Free-form metadata attached to a key, e.g. the provider tokens.
pub type KeyAttributes = serde_json::Map<String, serde_json::Value>;

/// A login key owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub key: String,
    #[serde(default)]
    pub attribs: KeyAttributes,
}

impl Key {
    #[must_use]
    pub fn new(key: String, attribs: KeyAttributes) -> Self {
        Self { key, attribs }
    }

    /// Returns the `(kind, value)` pair of this key.
    #[must_use]
    pub fn split(&self) -> (&str, &str) {
        split_auth_key(&self.key)
    }
}

/// Build a login key from its kind and value.
#[must_use]
pub fn new_auth_key(kind: &str, value: &str) -> String {
    format!("{kind}{KEY_SEPARATOR}{value}")
}

/// Split a login key into `(kind, value)` on the first separator.
///
/// A key without a separator yields an empty value.
#[must_use]
pub fn split_auth_key(key: &str) -> (&str, &str) {
    key.split_once(KEY_SEPARATOR).unwrap_or((key, ""))
}

/// Validate the shape of a login key.
///
/// # Errors
/// Returns `InvalidInput` (code `invalid_key`) when the kind is not made of
/// letters and underscores, or when the value is empty or has surrounding
/// whitespace.
pub fn validate_auth_key(key: &str) -> Result<()> {
    let Some((kind, value)) = key.split_once(KEY_SEPARATOR) else {
        return Err(Error::invalid_input()
            .coded("invalid_key")
            .hint("key has no kind separator"));
    };

    if !KEY_KIND_PATTERN.is_match(kind) {
        return Err(Error::invalid_input()
            .coded("invalid_key")
            .hint(format!("key kind '{kind}' is not valid")));
    }

    if value.is_empty() || value.trim() != value {
        return Err(Error::invalid_input()
            .coded("invalid_key")
            .hint("key value must be non-empty without surrounding spaces"));
    }

    Ok(())
}
