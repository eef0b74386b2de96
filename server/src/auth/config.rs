//! Authentication settings.
//!
//! # Pre-conditions
//! - `signing_secret` is at least [`AuthConfig::MIN_SECRET_LEN`] bytes long.
//!
//! # Post-conditions
//! - After [`AuthConfig::sanitise`], page routes are absolute URLs and every
//!   optional setting has a value.
//!
//! # Invariants
//! - `enabled_kinds` is never empty once sanitised.

use std::time::Duration;

use reqwest::Url;

use crate::error::{Error, Result};
use crate::identity::DEFAULT_USER_KIND;
use crate::token::DEFAULT_SESSION_TTL;

/// Settings of the auth service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for session tokens and the OAuth2 flow-state cookie.
    pub signing_secret: String,
    /// Lifetime of issued sessions.
    pub session_ttl: Duration,
    /// Name of the session cookie.
    pub session_cookie: String,
    /// User kinds allowed to register. The first one is the default.
    pub enabled_kinds: Vec<String>,
    /// Page that form logins are redirected back to.
    pub login_page_route: Option<String>,
    /// Page that form registrations are redirected back to.
    pub register_page_route: Option<String>,
    /// Mark cookies `Secure`.
    pub secure_cookies: bool,
    /// Public URL of the service, set by [`AuthConfig::sanitise`].
    pub base_url: Option<Url>,
}

impl AuthConfig {
    /// Default session cookie name.
    pub const DEFAULT_SESSION_COOKIE: &'static str = "_warden_auth";
    /// Cookie carrying the OAuth2 flow state.
    pub const FLOW_STATE_COOKIE: &'static str = "_oauth_state";
    /// Lifetime of the OAuth2 flow state.
    pub const FLOW_STATE_TTL: Duration = Duration::from_secs(10 * 60);
    /// Shortest accepted signing secret, in bytes.
    pub const MIN_SECRET_LEN: usize = 16;

    /// Settings with defaults for everything but the secret.
    #[must_use]
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            session_ttl: DEFAULT_SESSION_TTL,
            session_cookie: Self::DEFAULT_SESSION_COOKIE.to_string(),
            enabled_kinds: vec![DEFAULT_USER_KIND.to_string()],
            login_page_route: None,
            register_page_route: None,
            secure_cookies: false,
            base_url: None,
        }
    }

    /// Fill in defaults and resolve page routes against `base_url`.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the secret is too short or a page route
    /// cannot be joined to the base URL.
    pub fn sanitise(mut self, base_url: &Url) -> Result<Self> {
        if self.signing_secret.len() < Self::MIN_SECRET_LEN {
            return Err(Error::invalid_input().hint(format!(
                "signing secret must be at least {} bytes",
                Self::MIN_SECRET_LEN
            )));
        }

        if self.session_ttl.is_zero() {
            self.session_ttl = DEFAULT_SESSION_TTL;
        }

        if self.session_cookie.trim().is_empty() {
            self.session_cookie = Self::DEFAULT_SESSION_COOKIE.to_string();
        }

        self.enabled_kinds.retain(|kind| !kind.trim().is_empty());
        if self.enabled_kinds.is_empty() {
            self.enabled_kinds = vec![DEFAULT_USER_KIND.to_string()];
        }

        self.login_page_route = resolve_route(base_url, self.login_page_route.take())?;
        self.register_page_route = resolve_route(base_url, self.register_page_route.take())?;
        self.base_url = Some(base_url.clone());
        Ok(self)
    }

    /// Kind given to users that do not ask for one.
    #[must_use]
    pub fn default_kind(&self) -> &str {
        self.enabled_kinds
            .first()
            .map_or(DEFAULT_USER_KIND, String::as_str)
    }

    #[must_use]
    pub fn is_enabled_kind(&self, kind: &str) -> bool {
        self.enabled_kinds.iter().any(|k| k == kind)
    }

    /// `target` if it is safe to send a browser to after login.
    ///
    /// Only paths on this service and absolute URLs with the origin of
    /// `base_url` qualify. Scheme-relative (`//host`) and backslash forms are
    /// refused since browsers read them as another host.
    #[must_use]
    pub fn safe_redirect(&self, target: &str) -> Option<String> {
        let target = target.trim();
        if target.is_empty() || target.contains('\\') || target.chars().any(char::is_control) {
            return None;
        }

        if target.starts_with('/') {
            return (!target.starts_with("//")).then(|| target.to_string());
        }

        let base = self.base_url.as_ref()?;
        Url::parse(target)
            .ok()
            .filter(|url| url.origin() == base.origin())
            .map(String::from)
    }
}

fn resolve_route(base_url: &Url, route: Option<String>) -> Result<Option<String>> {
    let Some(route) = route.filter(|r| !r.trim().is_empty()) else {
        return Ok(None);
    };

    base_url
        .join(&route)
        .map(|url| Some(url.to_string()))
        .map_err(|e| {
            Error::invalid_input()
                .caused_by(e)
                .hint(format!("page route '{route}' is not valid"))
        })
}
