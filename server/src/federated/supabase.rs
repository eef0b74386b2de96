//! Supabase access-token verification.
//!
//! Tokens are checked by asking the Supabase auth server who they belong to;
//! nothing is verified locally.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::authenticator::Authenticator;
use crate::error::{Error, Result};
use crate::identity::random::rand_alnum;
use crate::identity::{DEFAULT_USER_KIND, Session};
use crate::token::invalid_token;

const USER_PATH: &str = "/auth/v1/user";

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    #[serde(default)]
    role: String,
}

#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
}

/// Proxies token verification to a Supabase project.
pub struct SupabaseAuth {
    url: String,
    api_key: String,
    http: reqwest::Client,
}

impl SupabaseAuth {
    /// `url` is the project URL, e.g. `https://<ref>.supabase.co`.
    #[must_use]
    pub fn new(url: &str, api_key: impl Into<String>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn fetch_user(&self, token: &str) -> Result<SupabaseUser> {
        let response = self
            .http
            .get(format!("{}{USER_PATH}", self.url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::internal().caused_by(e).hint("calling supabase auth"))?;

        match response.status() {
            StatusCode::OK => response
                .json::<SupabaseUser>()
                .await
                .map_err(|e| Error::internal().caused_by(e).hint("supabase returned an invalid user")),
            StatusCode::UNAUTHORIZED => Err(invalid_token("supabase rejected the token")),
            status => Err(Error::internal().hint(format!("supabase answered {status}"))),
        }
    }
}

impl std::fmt::Debug for SupabaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAuth")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for SupabaseAuth {
    async fn authenticate(&self, token: &str) -> Result<Session> {
        if token.is_empty() {
            return Err(invalid_token("token is empty"));
        }

        let user = self.fetch_user(token).await?;
        let claims = unverified_claims(token)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| invalid_token("exp out of range"))?;
        let created_at = claims
            .iat
            .and_then(|iat| DateTime::from_timestamp(iat, 0))
            .unwrap_or_else(Utc::now);

        let user_kind = if user.role.is_empty() || user.role == "authenticated" {
            DEFAULT_USER_KIND.to_string()
        } else {
            user.role
        };

        Ok(Session {
            id: rand_alnum(12),
            token: token.to_string(),
            user_id: user.id,
            user_kind,
            created_at,
            expires_at,
        })
    }
}

/// Read the payload of a token the auth server already accepted.
fn unverified_claims(token: &str) -> Result<UnverifiedClaims> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| invalid_token("token is not a jwt"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| invalid_token("token payload is not base64").caused_by(e))?;
    serde_json::from_slice(&bytes).map_err(|e| invalid_token("token payload has no exp").caused_by(e))
}
