//! Token authentication capability.
//!
//! The request gate does not care where a bearer token came from; it hands it
//! to whichever [`Authenticator`] was selected at startup. The local
//! [`TokenIssuer`] is the default; federated backends live in
//! [`crate::federated`].

use async_trait::async_trait;

use crate::error::Result;
use crate::identity::Session;
use crate::token::TokenIssuer;

/// Turns a bearer token into a verified [`Session`].
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify `token`.
    ///
    /// # Errors
    /// `MissingAuth`, `InvalidInput` or `NotFound` when the token is not
    /// acceptable; `InternalIssue` when verification could not be carried out.
    async fn authenticate(&self, token: &str) -> Result<Session>;
}

#[async_trait]
impl Authenticator for TokenIssuer {
    async fn authenticate(&self, token: &str) -> Result<Session> {
        self.restore_session(token)
    }
}
