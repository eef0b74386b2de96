//! GitHub login.
//!
//! `/user` does not always include an email; when it is missing the primary
//! verified address from `/user/emails` is used.

use serde::Deserialize;

use super::oauth::{Endpoints, OAuthCredentials, OAuthProvider, ProfileApi, get_json};
use super::Profile;
use crate::error::{Error, Result};

const ENDPOINTS: Endpoints = Endpoints {
    name: "github",
    auth_url: "https://github.com/login/oauth/authorize",
    token_url: "https://github.com/login/oauth/access_token",
    default_scopes: &["read:user", "user:email"],
    profile_api: ProfileApi::GitHub,
};

const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

/// GitHub user info from API.
#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    #[serde(default)]
    location: Option<String>,
    avatar_url: Option<String>,
}

/// GitHub email info from API.
#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Build the GitHub provider.
///
/// # Errors
/// Returns `InvalidInput` if `redirect_url` is not a valid URL.
pub fn github(credentials: &OAuthCredentials, redirect_url: &str) -> Result<OAuthProvider> {
    OAuthProvider::new(&ENDPOINTS, credentials, redirect_url)
}

pub(super) async fn fetch_profile(http: &reqwest::Client, access_token: &str) -> Result<Profile> {
    let raw: serde_json::Value = get_json(http, USER_URL, access_token).await?;
    let user: GitHubUser = serde_json::from_value(raw.clone())
        .map_err(|e| Error::internal().caused_by(e).hint("decoding github user"))?;

    let email = match user.email.filter(|email| !email.is_empty()) {
        Some(email) => email,
        None => {
            let emails: Vec<GitHubEmail> = get_json(http, EMAILS_URL, access_token).await?;
            primary_email(emails).ok_or_else(|| {
                Error::internal().hint("github account has no verified primary email")
            })?
        }
    };

    Ok(Profile {
        subject_id: user.id.to_string(),
        email,
        name: user.name.or_else(|| Some(user.login.clone())),
        nick_name: Some(user.login),
        location: user.location.filter(|l| !l.is_empty()),
        picture: user.avatar_url,
        raw,
    })
}

fn primary_email(emails: Vec<GitHubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}
