//! Username/email + password credentials.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::identity::{
    KEY_KIND_EMAIL, KEY_KIND_USERNAME, is_valid_email, is_valid_username, new_auth_key,
};

/// Credentials submitted to `/register` and `/login`, as a form or as JSON.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Where form submissions are sent after success.
    #[serde(default)]
    pub redirect_to: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("kind", &self.kind)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Trim the identifiers, default the kind and check their shape.
    ///
    /// # Errors
    /// Returns `InvalidInput` with code `invalid_creds` if neither email nor
    /// username is given, or if a given one is malformed.
    pub fn sanitize(mut self, default_kind: &str) -> Result<Self> {
        self.kind = self.kind.trim().to_string();
        self.email = self.email.trim().to_string();
        self.username = self.username.trim().to_string();
        if self.kind.is_empty() {
            self.kind = default_kind.to_string();
        }

        if self.email.is_empty() && self.username.is_empty() {
            return Err(invalid_creds("username or email must be specified"));
        }
        if !self.email.is_empty() && !is_valid_email(&self.email) {
            return Err(invalid_creds("invalid email"));
        }
        if !self.username.is_empty() && !is_valid_username(&self.username) {
            return Err(invalid_creds("invalid username"));
        }
        Ok(self)
    }

    /// Login key to look the user up by. Email wins over username.
    #[must_use]
    pub fn login_key(&self) -> String {
        if self.email.is_empty() {
            new_auth_key(KEY_KIND_USERNAME, &self.username)
        } else {
            new_auth_key(KEY_KIND_EMAIL, &self.email)
        }
    }
}

fn invalid_creds(hint: &str) -> Error {
    Error::invalid_input().coded("invalid_creds").hint(hint)
}
