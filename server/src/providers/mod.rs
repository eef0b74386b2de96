//! Third-party OAuth2 identity providers.
//!
//! A [`Provider`] knows how to start an authorization-code flow, finish it from
//! the callback query and fetch the signed-in user's profile. Its in-flight
//! state is a [`ProviderSession`], which round-trips through the flow-state
//! cookie as an opaque blob.

mod github;
mod google;
mod oauth;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::UserData;

pub use github::github;
pub use google::google;
pub use oauth::{OAuthCredentials, OAuthProvider};

/// Query parameters of a provider callback.
pub type CallbackParams = HashMap<String, String>;

/// In-flight state of one authorization flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    /// Authorization URL the user was sent to. Carries the `state` parameter.
    pub auth_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce_verifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ProviderSession {
    #[must_use]
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Serialize to an opaque blob.
    ///
    /// # Errors
    /// Returns `InternalIssue` if serialization fails.
    pub fn marshal(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::internal().caused_by(e).hint("marshal provider session"))
    }

    /// Parse a blob produced by [`ProviderSession::marshal`].
    ///
    /// # Errors
    /// Returns `InvalidInput` if the blob is not a valid session.
    pub fn unmarshal(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).map_err(|e| {
            Error::invalid_input()
                .caused_by(e)
                .hint("provider session blob is corrupt")
        })
    }
}

/// Profile of the signed-in user as reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable id of the user at the provider.
    pub subject_id: String,
    pub email: String,
    pub name: Option<String>,
    /// Handle at the provider, e.g. the GitHub login.
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub picture: Option<String>,
    /// Full provider response.
    pub raw: serde_json::Value,
}

impl Profile {
    /// Profile fields copied into the local user's data.
    #[must_use]
    pub fn user_data(&self) -> UserData {
        [
            ("name", &self.name),
            ("nick_name", &self.nick_name),
            ("location", &self.location),
            ("picture", &self.picture),
        ]
        .into_iter()
        .filter_map(|(field, value)| {
            Some((field.to_string(), serde_json::Value::from(value.clone()?)))
        })
        .collect()
    }
}

/// An OAuth2 identity provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name used in URLs and as the login key kind.
    fn name(&self) -> &str;

    /// Start a flow whose authorization URL carries `state`.
    ///
    /// # Errors
    /// `InternalIssue` if the authorization URL cannot be built.
    fn begin_auth(&self, state: &str) -> Result<ProviderSession>;

    /// Restore a session from the blob stored in the flow state.
    ///
    /// # Errors
    /// `InvalidInput` if the blob is corrupt.
    fn restore_session(&self, blob: &str) -> Result<ProviderSession> {
        ProviderSession::unmarshal(blob)
    }

    /// Exchange the callback's authorization code for tokens.
    ///
    /// # Errors
    /// `InvalidInput` if the callback carries no code; `InternalIssue` if the
    /// exchange fails.
    async fn authorize(&self, session: &mut ProviderSession, params: &CallbackParams)
    -> Result<()>;

    /// Fetch the profile of the authorized user.
    ///
    /// # Errors
    /// `InternalIssue` if the provider cannot be reached or answers badly.
    async fn fetch_profile(&self, session: &ProviderSession) -> Result<Profile>;
}
