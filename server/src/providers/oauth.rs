//! Generic authorization-code + PKCE provider built on the `oauth2` crate.
//!
//! The provider itself is stateless: the PKCE verifier and the tokens live in
//! the [`ProviderSession`] that travels with the flow state.

use async_trait::async_trait;
use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};

use super::{CallbackParams, Profile, Provider, ProviderSession, github, google};
use crate::error::{Error, Result};

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Client registration at a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Requested scopes. Empty means the provider's defaults.
    pub scopes: Vec<String>,
}

/// Where the profile of an authorized user is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ProfileApi {
    GitHub,
    Google,
}

/// Static description of a provider's endpoints.
pub(super) struct Endpoints {
    pub name: &'static str,
    pub auth_url: &'static str,
    pub token_url: &'static str,
    pub default_scopes: &'static [&'static str],
    pub profile_api: ProfileApi,
}

/// An OAuth2 provider using the authorization-code grant with PKCE.
pub struct OAuthProvider {
    name: String,
    client: ConfiguredClient,
    scopes: Vec<String>,
    profile_api: ProfileApi,
    http: reqwest::Client,
}

impl std::fmt::Debug for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProvider")
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl OAuthProvider {
    /// Build a provider.
    ///
    /// # Arguments
    /// * `endpoints` - The provider's endpoints and defaults.
    /// * `credentials` - Client registration.
    /// * `redirect_url` - Absolute URL of the callback route.
    ///
    /// # Errors
    /// Returns `InvalidInput` if a URL is not valid, `InternalIssue` if the
    /// HTTP client cannot be built.
    pub(super) fn new(
        endpoints: &Endpoints,
        credentials: &OAuthCredentials,
        redirect_url: &str,
    ) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
            .set_client_secret(ClientSecret::new(credentials.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(endpoints.auth_url.to_string()).map_err(invalid_url)?)
            .set_token_uri(TokenUrl::new(endpoints.token_url.to_string()).map_err(invalid_url)?)
            .set_redirect_uri(RedirectUrl::new(redirect_url.to_string()).map_err(invalid_url)?);

        let scopes = if credentials.scopes.is_empty() {
            endpoints
                .default_scopes
                .iter()
                .map(ToString::to_string)
                .collect()
        } else {
            credentials.scopes.clone()
        };

        // Redirects stay disabled for the token exchange (SSRF).
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::internal().caused_by(e).hint("building http client"))?;

        Ok(Self {
            name: endpoints.name.to_string(),
            client,
            scopes,
            profile_api: endpoints.profile_api,
            http,
        })
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

#[async_trait]
impl Provider for OAuthProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin_auth(&self, state: &str) -> Result<ProviderSession> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let state = state.to_string();

        let (auth_url, _) = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        Ok(ProviderSession {
            auth_url: auth_url.to_string(),
            pkce_verifier: Some(pkce_verifier.secret().clone()),
            ..ProviderSession::default()
        })
    }

    async fn authorize(
        &self,
        session: &mut ProviderSession,
        params: &CallbackParams,
    ) -> Result<()> {
        if let Some(error) = params.get("error") {
            return Err(Error::invalid_input()
                .coded("invalid_callback")
                .hint(format!("provider returned error '{error}'")));
        }

        let code = params
            .get("code")
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                Error::invalid_input()
                    .coded("invalid_callback")
                    .hint("callback has no authorization code")
            })?;

        let mut request = self
            .client
            .exchange_code(AuthorizationCode::new(code.clone()));
        if let Some(verifier) = &session.pkce_verifier {
            request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.clone()));
        }

        let token = request
            .request_async(&self.http)
            .await
            .map_err(|e| Error::internal().hint(format!("{} code exchange failed: {e}", self.name)))?;

        session.access_token = Some(token.access_token().secret().clone());
        session.refresh_token = token.refresh_token().map(|t| t.secret().clone());
        session.expires_at = token
            .expires_in()
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);
        Ok(())
    }

    async fn fetch_profile(&self, session: &ProviderSession) -> Result<Profile> {
        let access_token = session.access_token.as_deref().ok_or_else(|| {
            Error::internal().hint(format!("{} session is not authorized", self.name))
        })?;

        match self.profile_api {
            ProfileApi::GitHub => github::fetch_profile(&self.http, access_token).await,
            ProfileApi::Google => google::fetch_profile(&self.http, access_token).await,
        }
    }
}

fn invalid_url(e: oauth2::url::ParseError) -> Error {
    Error::invalid_input()
        .coded("invalid_provider")
        .caused_by(e)
        .hint("provider URL is not valid")
}

/// GET a JSON document with a bearer token.
pub(super) async fn get_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
    access_token: &str,
) -> Result<T> {
    let response = http
        .get(url)
        .bearer_auth(access_token)
        .header(reqwest::header::USER_AGENT, "warden")
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| Error::internal().caused_by(e).hint(format!("GET {url}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::internal().hint(format!("GET {url} returned {status}")));
    }

    response
        .json()
        .await
        .map_err(|e| Error::internal().caused_by(e).hint(format!("decoding {url}")))
}
