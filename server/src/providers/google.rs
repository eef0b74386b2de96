//! Google login through the OpenID Connect userinfo endpoint.

use serde::Deserialize;

use super::oauth::{Endpoints, OAuthCredentials, OAuthProvider, ProfileApi, get_json};
use super::Profile;
use crate::error::{Error, Result};

const ENDPOINTS: Endpoints = Endpoints {
    name: "google",
    auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    default_scopes: &["openid", "email", "profile"],
    profile_api: ProfileApi::Google,
};

const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Deserialize)]
struct GoogleUser {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    picture: Option<String>,
}

/// Build the Google provider.
///
/// # Errors
/// Returns `InvalidInput` if `redirect_url` is not a valid URL.
pub fn google(credentials: &OAuthCredentials, redirect_url: &str) -> Result<OAuthProvider> {
    OAuthProvider::new(&ENDPOINTS, credentials, redirect_url)
}

pub(super) async fn fetch_profile(http: &reqwest::Client, access_token: &str) -> Result<Profile> {
    let raw: serde_json::Value = get_json(http, USERINFO_URL, access_token).await?;
    profile_from_userinfo(raw)
}

fn profile_from_userinfo(raw: serde_json::Value) -> Result<Profile> {
    let user: GoogleUser = serde_json::from_value(raw.clone())
        .map_err(|e| Error::internal().caused_by(e).hint("decoding google userinfo"))?;

    Ok(Profile {
        subject_id: user.sub,
        email: user.email.unwrap_or_default(),
        name: user.name,
        nick_name: user.given_name,
        location: None,
        picture: user.picture,
        raw,
    })
}
