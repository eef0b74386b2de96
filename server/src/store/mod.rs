//! User persistence.
//!
//! The auth layer talks to storage through the [`UserRegistry`] trait.
//! [`SqliteRegistry`] is the production implementation.
//!
//! # Invariants
//! - `NotFound` means "no such user or key"; `Conflict` means a uniqueness
//!   constraint (id, email, username or key) was hit. Every other storage
//!   failure is reported as `InternalIssue`.
//! - `register` is atomic: either the user and all its keys are stored, or
//!   nothing is.

mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::identity::{Key, User, UserData};

pub use sqlite::SqliteRegistry;

/// Storage of users and their login keys.
#[async_trait]
pub trait UserRegistry: Send + Sync {
    /// Resolve a user from a login key (`"<kind>/<value>"`).
    ///
    /// # Errors
    /// `NotFound` if no user owns the key.
    async fn get(&self, key: &str) -> Result<User>;

    /// Insert `user` together with its extra login keys in one transaction.
    ///
    /// # Errors
    /// `Conflict` if the id, email, username or any key is already taken.
    async fn register(&self, user: User, keys: Vec<Key>) -> Result<User>;

    /// Mark the user verified if `token` matches its pending verify token.
    ///
    /// # Errors
    /// `NotFound` if the user does not exist or the token does not match.
    async fn verify(&self, user_id: &str, token: &str) -> Result<User>;

    /// Replace the password hash of a user.
    ///
    /// # Errors
    /// `NotFound` if the user does not exist.
    async fn set_password(&self, user_id: &str, password_hash: &str) -> Result<()>;

    /// Replace the profile data of a user.
    ///
    /// # Errors
    /// `NotFound` if the user does not exist.
    async fn set_user_data(&self, user_id: &str, data: UserData) -> Result<()>;
}
