//! Password accounts: registration, login, verification and profile updates.
//!
//! # Invariants
//! - Registration stores the user and all its login keys atomically.
//! - Login failures all surface as `MissingAuth`; the reason is only in the
//!   hint, so clients cannot probe which accounts exist.

use chrono::Utc;

use super::{Auth, Credentials};
use crate::error::{Error, ErrorKind, Result};
use crate::identity::{
    KEY_KIND_ID, Key, Session, User, UserData, is_valid_email, new_auth_key, validate_auth_key,
};
use crate::password::{
    check_password_against_nothing, check_password_blocking, hash_password_blocking,
};

impl Auth {
    /// Store a new user and its extra login keys.
    ///
    /// Stamps the timestamps and clears `verified_at` before validating.
    ///
    /// # Errors
    /// - `InvalidInput` (`invalid_user`, `invalid_kind`, `invalid_key`) if the
    ///   user or a key is not valid.
    /// - `Conflict` if the id, email, username or a key is taken.
    pub async fn register_user(&self, mut user: User, keys: Vec<Key>) -> Result<User> {
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;
        user.verified_at = None;
        user.validate()?;

        if !self.config.is_enabled_kind(&user.kind) {
            return Err(Error::invalid_input()
                .coded("invalid_kind")
                .hint(format!("user kind '{}' is not enabled", user.kind)));
        }

        for key in &keys {
            validate_auth_key(&key.key)?;
        }

        let user = self.registry.register(user, keys).await?;
        tracing::info!(user_id = %user.id, kind = %user.kind, "registered user");
        Ok(user)
    }

    /// Register a password account.
    ///
    /// # Errors
    /// `InvalidInput` for bad credentials or a weak password, `Conflict` if
    /// the email or username is taken, `InternalIssue` otherwise.
    pub async fn register(&self, credentials: Credentials) -> Result<User> {
        let credentials = credentials.sanitize(self.config.default_kind())?;
        if !is_valid_email(&credentials.email) {
            return Err(Error::invalid_input()
                .coded("invalid_email")
                .hint("registration requires a valid email"));
        }

        let password_hash = hash_password_blocking(credentials.password).await?;
        let mut user = User::new(&credentials.kind, &credentials.username, &credentials.email);
        user.password_hash = Some(password_hash);

        self.register_user(user, Vec::new()).await.map_err(|e| {
            if e.is_any(&[ErrorKind::Conflict, ErrorKind::InvalidInput]) {
                e
            } else {
                Error::internal().caused_by(e)
            }
        })
    }

    /// Check password credentials and return the matching user.
    ///
    /// # Errors
    /// `InvalidInput` for malformed credentials, `MissingAuth` if no user
    /// matches, `InternalIssue` if storage fails.
    pub async fn login(&self, credentials: Credentials) -> Result<User> {
        let credentials = credentials.sanitize(self.config.default_kind())?;

        let user = match self.registry.get(&credentials.login_key()).await {
            Ok(user) => user,
            Err(e) if e.is(ErrorKind::NotFound) => {
                check_password_against_nothing(credentials.password).await;
                return Err(Error::missing_auth().hint("user not found"));
            }
            Err(e) => return Err(e),
        };

        if !check_password_blocking(user.password_hash.clone(), credentials.password).await {
            return Err(Error::missing_auth().hint("password mismatch"));
        }
        if !credentials.email.is_empty() && credentials.email != user.email {
            return Err(Error::missing_auth().hint("email mismatch"));
        }
        if user.kind != credentials.kind {
            return Err(Error::missing_auth().hint("user kind mismatch"));
        }

        tracing::info!(user_id = %user.id, "password login");
        Ok(user)
    }

    /// Confirm a user's email with the one-shot verify token.
    ///
    /// # Errors
    /// `NotFound` if the id or token does not match a pending verification.
    pub async fn verify_user(&self, user_id: &str, token: &str) -> Result<User> {
        if user_id.is_empty() || token.is_empty() {
            return Err(Error::not_found().hint("id and token are required"));
        }
        let user = self.registry.verify(user_id, token).await?;
        tracing::info!(user_id = %user.id, "verified user");
        Ok(user)
    }

    /// Resolve a user by login key.
    ///
    /// # Errors
    /// `NotFound` if no user owns the key.
    pub async fn get_user(&self, key: &str) -> Result<User> {
        self.registry.get(key).await
    }

    /// Replace the password of a user.
    ///
    /// # Errors
    /// `InvalidInput` for a weak password, `NotFound` for an unknown user.
    pub async fn set_password(&self, user_id: &str, password: String) -> Result<()> {
        let password_hash = hash_password_blocking(password).await?;
        self.registry.set_password(user_id, &password_hash).await?;
        tracing::info!(user_id = %user_id, "password changed");
        Ok(())
    }

    /// Replace the profile data of a user and return the updated user.
    ///
    /// # Errors
    /// `NotFound` for an unknown user.
    pub async fn set_user_data(&self, user_id: &str, data: UserData) -> Result<User> {
        self.registry.set_user_data(user_id, data).await?;
        self.get_user(&new_auth_key(KEY_KIND_ID, user_id)).await
    }

    /// Sign a session for `user`.
    ///
    /// # Errors
    /// `InternalIssue` if signing fails.
    pub fn create_session(&self, user: &User) -> Result<Session> {
        self.tokens.create_session(user)
    }
}
