//! Shared fixtures for unit and end-to-end tests.

#![allow(clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;

use crate::auth::{Auth, AuthConfig, Credentials};
use crate::error::{Error, Result};
use crate::providers::{CallbackParams, Profile, Provider, ProviderSession};
use crate::store::SqliteRegistry;

/// Signing secret used by every test service.
pub const TEST_SECRET: &str = "warden-test-secret-0123456789";

/// Base URL page routes are resolved against.
pub const TEST_BASE_URL: &str = "http://localhost:3000/";

/// Name of the [`MockProvider`].
pub const MOCK_PROVIDER: &str = "mock";

/// Subject id the mock provider reports.
pub const MOCK_SUBJECT: &str = "42";

/// Email the mock provider reports.
pub const MOCK_EMAIL: &str = "octo@example.com";

/// An auth service over an in-memory registry with the mock provider.
pub struct TestAuth {
    pub auth: Arc<Auth>,
    pub registry: SqliteRegistry,
    pub provider: Arc<MockProvider>,
}

impl TestAuth {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Build the service from `config`, which is sanitised first.
    #[must_use]
    pub fn with_config(config: AuthConfig) -> Self {
        let base = Url::parse(TEST_BASE_URL).expect("base url");
        let config = config.sanitise(&base).expect("test config");

        let registry = SqliteRegistry::open_in_memory().expect("in-memory registry");
        let provider = Arc::new(MockProvider::new());
        let auth = Auth::new(config, Arc::new(registry.clone()))
            .expect("auth service")
            .with_provider(Arc::clone(&provider) as Arc<dyn Provider>);

        Self {
            auth: Arc::new(auth),
            registry,
            provider,
        }
    }

    /// The `state` parameter of an authorization URL.
    #[must_use]
    pub fn state_from(&self, auth_url: &str) -> String {
        let url = Url::parse(auth_url).expect("authorization url");
        url.query_pairs()
            .find(|(name, _)| name == "state")
            .map(|(_, value)| value.into_owned())
            .expect("state parameter")
    }
}

impl Default for TestAuth {
    fn default() -> Self {
        Self::new()
    }
}

/// Config shared by the tests: default kind `user`, `admin` also enabled.
#[must_use]
pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::new(TEST_SECRET);
    config.enabled_kinds = vec!["user".to_string(), "admin".to_string()];
    config
}

#[must_use]
pub fn credentials(email: &str, username: &str, password: &str) -> Credentials {
    Credentials {
        email: email.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        ..Credentials::default()
    }
}

#[must_use]
pub fn callback_params(state: &str, code: &str) -> CallbackParams {
    CallbackParams::from([
        ("state".to_string(), state.to_string()),
        ("code".to_string(), code.to_string()),
    ])
}

/// Provider that authorizes every code and always reports the same person.
#[derive(Debug)]
pub struct MockProvider {
    name: Mutex<String>,
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: Mutex::new("Octo Cat".to_string()),
        }
    }

    /// Change the display name reported by later profile fetches.
    pub fn set_name(&self, name: &str) {
        *self.name.lock() = name.to_string();
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        MOCK_PROVIDER
    }

    fn begin_auth(&self, state: &str) -> Result<ProviderSession> {
        let mut url = Url::parse("https://idp.example/authorize").expect("mock url");
        url.query_pairs_mut()
            .append_pair("client_id", "test-client")
            .append_pair("state", state);
        Ok(ProviderSession {
            auth_url: url.into(),
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
                .hint(error.clone()));
        }
        let code = params.get("code").filter(|c| !c.is_empty()).ok_or_else(|| {
            Error::invalid_input()
                .coded("invalid_callback")
                .hint("callback carries no code")
        })?;
        session.access_token = Some(format!("access-{code}"));
        session.refresh_token = Some(format!("refresh-{code}"));
        Ok(())
    }

    async fn fetch_profile(&self, session: &ProviderSession) -> Result<Profile> {
        if session.access_token.is_none() {
            return Err(Error::internal().hint("session is not authorized"));
        }
        let name = self.name.lock().clone();
        Ok(Profile {
            subject_id: MOCK_SUBJECT.to_string(),
            email: MOCK_EMAIL.to_string(),
            raw: serde_json::json!({ "id": 42, "login": "octo", "name": name }),
            name: Some(name),
            nick_name: Some("octo".to_string()),
            location: Some("San Francisco".to_string()),
            picture: None,
        })
    }
}
