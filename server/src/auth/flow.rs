//! OAuth2 login flow.
//!
//! `begin_auth` picks the provider, generates a random `state` and returns the
//! provider's authorization URL together with a [`FlowState`]. The flow state
//! is kept by the browser in a signed, short-lived cookie and consumed by
//! `complete_auth` when the provider redirects back.
//!
//! # Invariants
//! - A callback is only accepted if its `state` equals the `state` embedded in
//!   the authorization URL of the stored provider session.
//! - Nothing is written to storage before that check passes.
//! - The flow-state cookie is signed with the server secret and expires after
//!   [`AuthConfig::FLOW_STATE_TTL`].

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::{Auth, AuthConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::identity::random::rand_alnum;
use crate::identity::{Key, KeyAttributes, User, new_auth_key};
use crate::providers::{CallbackParams, Profile, ProviderSession};

/// Length of the random OAuth2 `state` value.
const STATE_LEN: usize = 10;

/// Audience of flow-state tokens. Keeps them apart from session tokens.
const FLOW_AUDIENCE: &str = "oauth2_flow";

/// State carried from the redirect to the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub user_kind: String,
    pub provider: String,
    /// Marshalled provider session.
    pub session: String,
    #[serde(default)]
    pub redirect_to: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FlowClaims {
    #[serde(flatten)]
    state: FlowState,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Signs and verifies flow-state cookies.
#[derive(Clone)]
pub(super) struct FlowStateCodec {
    secret: Arc<[u8]>,
}

impl FlowStateCodec {
    pub(super) fn new(secret: &[u8]) -> Self {
        Self {
            secret: Arc::from(secret),
        }
    }

    pub(super) fn encode(&self, state: &FlowState) -> Result<String> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(AuthConfig::FLOW_STATE_TTL.as_secs()).unwrap_or(i64::MAX);
        let claims = FlowClaims {
            state: state.clone(),
            aud: FLOW_AUDIENCE.to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        };

        encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| Error::internal().caused_by(e).hint("signing oauth2 flow state"))
    }

    pub(super) fn decode(&self, token: &str) -> Result<FlowState> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;
        validation.set_audience(&[FLOW_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "aud"]);

        decode::<FlowClaims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims.state)
            .map_err(|e| invalid_callback().caused_by(e).hint("flow state rejected"))
    }
}

/// Returns true if `actual` is the `state` the authorization URL was built with.
#[must_use]
pub fn check_callback_state(session: &ProviderSession, actual: &str) -> bool {
    if actual.is_empty() {
        return false;
    }
    let Ok(url) = Url::parse(session.auth_url()) else {
        return false;
    };
    url.query_pairs()
        .find(|(name, _)| name == "state")
        .is_some_and(|(_, expected)| expected == actual)
}

impl Auth {
    /// Start an OAuth2 login.
    ///
    /// Returns the authorization URL to redirect the browser to and the flow
    /// state to store alongside.
    ///
    /// # Errors
    /// - `InvalidInput` (`invalid_kind`) if the user kind is not enabled.
    /// - `InvalidInput` (`invalid_provider`) if the provider is unknown.
    /// - `InternalIssue` if the provider cannot start a session.
    ///
    /// A `redirect_to` that leaves this service is replaced by `/`.
    pub fn begin_auth(
        &self,
        user_kind: &str,
        provider: &str,
        redirect_to: &str,
    ) -> Result<(String, FlowState)> {
        let user_kind = match user_kind.trim() {
            "" => self.config.default_kind(),
            kind => kind,
        };
        if !self.config.is_enabled_kind(user_kind) {
            return Err(Error::invalid_input()
                .coded("invalid_kind")
                .hint(format!("user kind '{user_kind}' is not valid")));
        }

        let provider = self.provider(provider).ok_or_else(|| {
            Error::invalid_input()
                .coded("invalid_provider")
                .hint(format!("no provider named '{provider}'"))
        })?;

        let session = provider
            .begin_auth(&rand_alnum(STATE_LEN))
            .map_err(|e| Error::internal().caused_by(e))?;

        // An off-site target is replaced by the site root.
        let redirect_to = match redirect_to.trim() {
            "" => String::new(),
            target => self.config.safe_redirect(target).unwrap_or_else(|| "/".to_string()),
        };

        let state = FlowState {
            user_kind: user_kind.to_string(),
            provider: provider.name().to_string(),
            session: session.marshal()?,
            redirect_to,
        };
        Ok((session.auth_url, state))
    }

    /// Sign a flow state for the cookie.
    ///
    /// # Errors
    /// `InternalIssue` if signing fails.
    pub fn encode_flow_state(&self, state: &FlowState) -> Result<String> {
        self.flow_codec.encode(state)
    }

    /// Verify a flow-state cookie.
    ///
    /// # Errors
    /// `InvalidInput` (`invalid_callback`) if the cookie is forged or expired.
    pub fn decode_flow_state(&self, token: &str) -> Result<FlowState> {
        self.flow_codec.decode(token)
    }

    /// Finish an OAuth2 login from the provider callback.
    ///
    /// Resolves the provider identity to the local user, registering a new
    /// user with the provider's login key on first sight.
    ///
    /// # Errors
    /// - `InvalidInput` (`invalid_callback`) if the flow state is missing,
    ///   refers to an unknown provider, or the callback `state` does not match.
    /// - `Conflict` if a concurrent first login registered the same identity,
    ///   or the email already belongs to another user.
    /// - `InternalIssue` if the provider exchange or storage fails.
    pub async fn complete_auth(
        &self,
        flow: Option<FlowState>,
        params: &CallbackParams,
    ) -> Result<User> {
        let flow = flow.ok_or_else(|| invalid_callback().hint("oauth2 flow state is missing"))?;

        let provider = self.provider(&flow.provider).ok_or_else(|| {
            invalid_callback().hint(format!("unknown provider '{}'", flow.provider))
        })?;

        let mut session = provider
            .restore_session(&flow.session)
            .map_err(|e| invalid_callback().caused_by(e))?;

        let actual_state = params.get("state").map_or("", String::as_str);
        if !check_callback_state(&session, actual_state) {
            return Err(invalid_callback().hint("state value mismatch"));
        }

        provider.authorize(&mut session, params).await.map_err(|e| {
            if e.is(ErrorKind::InvalidInput) {
                e
            } else {
                Error::internal().caused_by(e)
            }
        })?;

        let profile = provider
            .fetch_profile(&session)
            .await
            .map_err(|e| Error::internal().caused_by(e))?;

        let login_key = new_auth_key(provider.name(), &profile.subject_id);
        match self.get_user(&login_key).await {
            Ok(user) => Ok(self.refresh_profile(user, &profile).await),
            Err(e) if e.is(ErrorKind::NotFound) => {
                let mut user = User::new(&flow.user_kind, "", &profile.email);
                user.data = profile.user_data();
                let key = Key::new(login_key, key_attributes(&profile, &session));

                let user = self.register_user(user, vec![key]).await.map_err(|e| {
                    if e.is(ErrorKind::Conflict) {
                        e
                    } else {
                        Error::internal().caused_by(e)
                    }
                })?;
                tracing::info!(user_id = %user.id, provider = %provider.name(), "registered user from oauth2 login");
                Ok(user)
            }
            Err(e) => Err(Error::internal().caused_by(e)),
        }
    }

    /// Copy changed profile fields from the provider onto an existing user.
    ///
    /// A failed refresh is logged and does not fail the login.
    async fn refresh_profile(&self, mut user: User, profile: &Profile) -> User {
        let mut data = user.data.clone();
        for (field, value) in profile.user_data() {
            data.insert(field, value);
        }
        if data == user.data {
            return user;
        }

        match self.registry.set_user_data(&user.id, data.clone()).await {
            Ok(()) => {
                tracing::debug!(user_id = %user.id, "refreshed profile from provider");
                user.data = data;
            }
            Err(e) => tracing::warn!(user_id = %user.id, "profile refresh failed: {e}"),
        }
        user
    }
}

fn key_attributes(profile: &Profile, session: &ProviderSession) -> KeyAttributes {
    let mut attribs = KeyAttributes::new();
    attribs.insert("user_id".to_string(), profile.subject_id.clone().into());
    attribs.insert(
        "expires_at".to_string(),
        session
            .expires_at
            .map_or(serde_json::Value::Null, |at| at.timestamp().into()),
    );
    attribs.insert(
        "access_token".to_string(),
        session.access_token.clone().into(),
    );
    attribs.insert(
        "refresh_token".to_string(),
        session.refresh_token.clone().into(),
    );
    attribs.insert("raw_data".to_string(), profile.raw.clone());
    attribs
}

fn invalid_callback() -> Error {
    Error::invalid_input().coded("invalid_callback")
}
