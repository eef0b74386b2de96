//! The local user record.
//!
//! Every login method (password, OAuth2 provider, federated token) resolves
//! to one `User`. The record is created once at registration and updated in
//! place afterwards; it is never hard-deleted.
//!
//! # Invariants
//! - `id` is alphanumeric and never changes.
//! - `username` starts with a letter, ends with a letter or digit and is at
//!   least three characters long.
//! - `email` is a syntactically valid address.
//! - `password_hash` and `verify_token` never leave the process: every value
//!   handed to a client goes through [`User::clone_safe`].

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::random::{CHARSET_DIGITS, rand_alnum, rand_str};
use crate::error::{Error, Result};

/// Kind assigned to users registered without one.
pub const DEFAULT_USER_KIND: &str = "user";

/// Length of generated user ids.
pub const USER_ID_LEN: usize = 16;

/// Length of generated verification tokens.
pub const VERIFY_TOKEN_LEN: usize = 10;

#[allow(clippy::expect_used)]
static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("id pattern compiles"));

#[allow(clippy::expect_used)]
static USERNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]+[A-Za-z0-9]$").expect("username pattern compiles")
});

#[allow(clippy::expect_used)]
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*$",
    )
    .expect("email pattern compiles")
});

/// Free-form profile data visible to the user (name, picture, locale, ...).
pub type UserData = serde_json::Map<String, serde_json::Value>;

/// Internal attributes. Never serialized to clients.
pub type UserAttributes = serde_json::Map<String, serde_json::Value>;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub data: UserData,
    pub email: String,
    pub username: String,
    #[serde(rename = "pwd_hash", default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_token: Option<String>,
    #[serde(skip)]
    pub attributes: UserAttributes,
}

impl User {
    /// Create a fresh, unverified user.
    ///
    /// Generates the id and the verification token. A blank kind falls back to
    /// [`DEFAULT_USER_KIND`]; a blank username is replaced with `user` followed
    /// by eight random digits.
    ///
    /// # Post-conditions
    /// - `verify_token` is set and `verified_at` is `None`.
    /// - `created_at == updated_at`.
    #[must_use]
    pub fn new(kind: &str, username: &str, email: &str) -> Self {
        let kind = match kind.trim() {
            "" => DEFAULT_USER_KIND.to_string(),
            kind => kind.to_string(),
        };
        let username = match username.trim() {
            "" => format!("user{}", rand_str(8, CHARSET_DIGITS)),
            username => username.to_string(),
        };
        let now = Utc::now();

        Self {
            id: rand_alnum(USER_ID_LEN),
            kind,
            data: UserData::new(),
            email: email.trim().to_string(),
            username,
            password_hash: None,
            created_at: now,
            updated_at: now,
            verified_at: None,
            verify_token: Some(rand_alnum(VERIFY_TOKEN_LEN)),
            attributes: UserAttributes::new(),
        }
    }

    /// Check the record invariants.
    ///
    /// # Errors
    /// Returns `InvalidInput` with code `invalid_user` naming the first field
    /// that is not valid.
    pub fn validate(&self) -> Result<()> {
        if !ID_PATTERN.is_match(&self.id) {
            return Err(invalid_user(format!("id '{}' must be alphanumeric", self.id)));
        }

        if !USERNAME_PATTERN.is_match(&self.username) {
            return Err(invalid_user(format!(
                "username '{}' is not valid",
                self.username
            )));
        }

        if !is_valid_email(&self.email) {
            return Err(invalid_user(format!("email '{}' is not valid", self.email)));
        }

        Ok(())
    }

    /// Whether the email address was confirmed.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    /// Clone the user, stripping secrets when `safe` is set.
    #[must_use]
    pub fn clone_with(&self, safe: bool) -> Self {
        let mut user = self.clone();
        if safe {
            user.password_hash = None;
            user.verify_token = None;
            user.attributes.clear();
        }
        user
    }

    /// Clone suitable for returning to clients.
    #[must_use]
    pub fn clone_safe(&self) -> Self {
        self.clone_with(true)
    }
}

/// Returns true if `email` is a syntactically valid address.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Returns true if `username` has a valid shape.
#[must_use]
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_PATTERN.is_match(username)
}

fn invalid_user(hint: String) -> Error {
    Error::invalid_input().coded("invalid_user").hint(hint)
}
