//! Authentication service.
//!
//! [`Auth`] owns everything a login path needs: the user registry, the
//! session token issuer, the authenticator used by the request gate and the
//! OAuth2 providers. It is built once at startup and shared behind an `Arc`.
//!
//! # Pre-conditions
//! - The configuration has been sanitised (see [`AuthConfig::sanitise`]).
//!
//! # Invariants
//! - Shared state is immutable after construction.
//! - Every user handed to a client is a safe clone.

mod accounts;
mod config;
mod credentials;
mod flow;
pub mod gate;
pub mod respond;
mod routes;

use std::collections::HashMap;
use std::sync::Arc;

use crate::authenticator::Authenticator;
use crate::error::Result;
use crate::identity::Session;
use crate::providers::Provider;
use crate::store::UserRegistry;
use crate::token::TokenIssuer;

pub use config::AuthConfig;
pub use credentials::Credentials;
pub use flow::{FlowState, check_callback_state};
pub use gate::{CurrentSession, RequestContext, RequireSession};
pub use routes::router;

use flow::FlowStateCodec;

/// The authentication service.
pub struct Auth {
    config: AuthConfig,
    registry: Arc<dyn UserRegistry>,
    tokens: TokenIssuer,
    authenticator: Arc<dyn Authenticator>,
    providers: HashMap<String, Arc<dyn Provider>>,
    flow_codec: FlowStateCodec,
}

impl Auth {
    /// Create the service with local session tokens as the authenticator.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the signing secret is empty.
    pub fn new(config: AuthConfig, registry: Arc<dyn UserRegistry>) -> Result<Self> {
        let secret = config.signing_secret.as_bytes();
        let tokens = TokenIssuer::new(secret, config.session_ttl)?;
        let flow_codec = FlowStateCodec::new(secret);

        Ok(Self {
            authenticator: Arc::new(tokens.clone()),
            config,
            registry,
            tokens,
            providers: HashMap::new(),
            flow_codec,
        })
    }

    /// Replace the authenticator used by the request gate.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Register an OAuth2 provider under its name.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        tracing::info!("enabled oauth2 provider '{}'", provider.name());
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<dyn UserRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.get(name)
    }

    /// Verify a bearer token with the configured authenticator.
    ///
    /// # Errors
    /// Whatever the authenticator reports.
    pub async fn authenticate(&self, token: &str) -> Result<Session> {
        self.authenticator.authenticate(token).await
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<&String> = self.providers.keys().collect();
        providers.sort();
        f.debug_struct("Auth")
            .field("config", &self.config.session_cookie)
            .field("providers", &providers)
            .finish_non_exhaustive()
    }
}
