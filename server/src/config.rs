//! Server configuration module.
//!
//! This module provides configuration loading for the warden server from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `WARDEN_LISTEN_PORT`: Port to listen on (default: `3000`)
//! - `WARDEN_DATABASE_PATH`: SQLite database file (default: `./data/warden.db`)
//! - `WARDEN_BASE_URL`: Public URL of the server (default: `http://localhost:<port>/`)
//! - `WARDEN_SIGNING_SECRET`: HMAC secret for session tokens (required, at least 16 bytes)
//! - `WARDEN_SESSION_TTL_SECS`: Session lifetime in seconds (default: 12 hours)
//! - `WARDEN_SESSION_COOKIE`: Session cookie name (default: `_warden_auth`)
//! - `WARDEN_ENABLED_KINDS`: Comma separated user kinds, first is the default (default: `user`)
//! - `WARDEN_LOGIN_PAGE`, `WARDEN_REGISTER_PAGE`: Pages form posts are sent back to
//! - `WARDEN_SECURE_COOKIES`: Mark cookies `Secure` (default: `false`)
//! - `WARDEN_AUTH_BACKEND`: `local`, `firebase` or `supabase` (default: `local`)
//! - `WARDEN_FIREBASE_PROJECT_ID`: Required by the `firebase` backend
//! - `WARDEN_SUPABASE_URL`, `WARDEN_SUPABASE_API_KEY`: Required by the `supabase` backend
//! - `WARDEN_GITHUB_CLIENT_ID`, `WARDEN_GITHUB_CLIENT_SECRET`, `WARDEN_GITHUB_SCOPES`
//! - `WARDEN_GOOGLE_CLIENT_ID`, `WARDEN_GOOGLE_CLIENT_SECRET`, `WARDEN_GOOGLE_SCOPES`
//!
//! # Invariants
//!
//! - `listen_port` is always a valid port number (1-65535)
//! - `auth` has been sanitised against `base_url`
//! - a provider is configured only if both its client id and secret are set

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::auth::AuthConfig;
use crate::providers::OAuthCredentials;

/// Which [`crate::authenticator::Authenticator`] verifies bearer tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthBackend {
    /// Session tokens issued by this server.
    Local,
    /// Firebase ID tokens of the given project.
    Firebase { project_id: String },
    /// Supabase access tokens, checked by the project's auth server.
    Supabase { url: String, api_key: String },
}

impl AuthBackend {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Firebase { .. } => "firebase",
            Self::Supabase { .. } => "supabase",
        }
    }
}

/// Server configuration.
///
/// # Pre-conditions
///
/// When constructed via `from_env()`:
/// - All required environment variables must be set
/// - All values must be valid for their respective types
///
/// # Post-conditions
///
/// - `listen_port` is always in the valid range (1-65535)
/// - `auth.signing_secret` is at least [`AuthConfig::MIN_SECRET_LEN`] bytes
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on.
    pub listen_port: u16,
    /// SQLite database holding users and login keys.
    pub database_path: PathBuf,
    /// Public URL of the server. OAuth2 callbacks and page routes are
    /// resolved against it.
    pub base_url: Url,
    pub auth: AuthConfig,
    pub backend: AuthBackend,
    pub github: Option<OAuthCredentials>,
    pub google: Option<OAuthCredentials>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    /// Default port for the server.
    pub const DEFAULT_PORT: u16 = 3000;
    /// Default database file.
    pub const DEFAULT_DATABASE_PATH: &'static str = "./data/warden.db";
    /// Path of the OAuth2 callback route.
    pub const OAUTH2_CALLBACK_PATH: &'static str = "/oauth2/cb";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `WARDEN_SIGNING_SECRET` is not set or shorter than 16 bytes
    /// - a numeric, boolean or URL variable cannot be parsed
    /// - the selected auth backend is missing its settings
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let listen_port = Self::load_listen_port(&env)?;
        let database_path = env
            .get("WARDEN_DATABASE_PATH")
            .map_or_else(|| PathBuf::from(Self::DEFAULT_DATABASE_PATH), PathBuf::from);
        let base_url = Self::load_base_url(&env, listen_port)?;
        let auth = Self::load_auth(&env, &base_url)?;
        let backend = Self::load_backend(&env)?;
        let github = Self::load_provider(&env, "GITHUB");
        let google = Self::load_provider(&env, "GOOGLE");

        Ok(Self {
            listen_port,
            database_path,
            base_url,
            auth,
            backend,
            github,
            google,
        })
    }

    /// Absolute URL of the OAuth2 callback route.
    #[must_use]
    pub fn oauth2_callback_url(&self) -> String {
        self.base_url
            .join(Self::OAUTH2_CALLBACK_PATH.trim_start_matches('/'))
            .map_or_else(|_| Self::OAUTH2_CALLBACK_PATH.to_string(), String::from)
    }

    /// Load the listen port.
    ///
    /// Returns the default if not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is set but not a valid port number.
    fn load_listen_port<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<u16, ConfigError> {
        let name = "WARDEN_LISTEN_PORT";
        match env.get(name) {
            Some(value) => match value.parse::<u16>() {
                Ok(port) if port > 0 => Ok(port),
                _ => Err(invalid(
                    name,
                    format!("'{value}' is not a valid port number (must be 1-65535)"),
                )),
            },
            None => Ok(Self::DEFAULT_PORT),
        }
    }

    fn load_base_url<F: Fn(&str) -> Option<String>>(
        env: &Env<F>,
        listen_port: u16,
    ) -> Result<Url, ConfigError> {
        let name = "WARDEN_BASE_URL";
        let value = env
            .get(name)
            .unwrap_or_else(|| format!("http://localhost:{listen_port}/"));
        Url::parse(&value).map_err(|e| invalid(name, format!("'{value}' is not a valid URL: {e}")))
    }

    /// Load the auth settings and sanitise them against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing secret is missing or too short, or a
    /// value cannot be parsed.
    fn load_auth<F: Fn(&str) -> Option<String>>(
        env: &Env<F>,
        base_url: &Url,
    ) -> Result<AuthConfig, ConfigError> {
        let secret_name = "WARDEN_SIGNING_SECRET";
        let secret = env
            .get(secret_name)
            .ok_or_else(|| ConfigError::MissingEnvVar(secret_name.to_string()))?;
        if secret.len() < AuthConfig::MIN_SECRET_LEN {
            return Err(invalid(
                secret_name,
                format!("must be at least {} bytes", AuthConfig::MIN_SECRET_LEN),
            ));
        }

        let mut auth = AuthConfig::new(secret);
        if let Some(value) = env.get("WARDEN_SESSION_TTL_SECS") {
            let secs = value.parse::<u64>().map_err(|_| {
                invalid("WARDEN_SESSION_TTL_SECS", format!("'{value}' is not a number of seconds"))
            })?;
            auth.session_ttl = Duration::from_secs(secs);
        }
        if let Some(cookie) = env.get("WARDEN_SESSION_COOKIE") {
            auth.session_cookie = cookie;
        }
        if let Some(kinds) = env.get("WARDEN_ENABLED_KINDS") {
            auth.enabled_kinds = split_list(&kinds);
        }
        auth.login_page_route = env.get("WARDEN_LOGIN_PAGE");
        auth.register_page_route = env.get("WARDEN_REGISTER_PAGE");
        auth.secure_cookies = match env.get("WARDEN_SECURE_COOKIES") {
            Some(value) => parse_bool("WARDEN_SECURE_COOKIES", &value)?,
            None => base_url.scheme() == "https",
        };

        auth.sanitise(base_url).map_err(|e| invalid("WARDEN_LOGIN_PAGE/WARDEN_REGISTER_PAGE", e.to_string()))
    }

    fn load_backend<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<AuthBackend, ConfigError> {
        let name = "WARDEN_AUTH_BACKEND";
        match env.get(name).as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("local") => Ok(AuthBackend::Local),
            Some("firebase") => Ok(AuthBackend::Firebase {
                project_id: env.require("WARDEN_FIREBASE_PROJECT_ID")?,
            }),
            Some("supabase") => {
                let url = env.require("WARDEN_SUPABASE_URL")?;
                Url::parse(&url).map_err(|e| {
                    invalid("WARDEN_SUPABASE_URL", format!("'{url}' is not a valid URL: {e}"))
                })?;
                Ok(AuthBackend::Supabase {
                    url,
                    api_key: env.require("WARDEN_SUPABASE_API_KEY")?,
                })
            }
            Some(other) => Err(invalid(
                name,
                format!("'{other}' is not one of local, firebase, supabase"),
            )),
        }
    }

    /// Load `WARDEN_<PROVIDER>_*`. The provider is disabled unless both the
    /// client id and secret are set.
    fn load_provider<F: Fn(&str) -> Option<String>>(
        env: &Env<F>,
        provider: &str,
    ) -> Option<OAuthCredentials> {
        let client_id = env.get(&format!("WARDEN_{provider}_CLIENT_ID"))?;
        let client_secret = env.get(&format!("WARDEN_{provider}_CLIENT_SECRET"))?;
        let scopes = env
            .get(&format!("WARDEN_{provider}_SCOPES"))
            .map(|s| split_list(&s))
            .unwrap_or_default();

        Some(OAuthCredentials {
            client_id,
            client_secret,
            scopes,
        })
    }
}

/// Variable lookup that treats blank values as unset.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
    }
}

fn invalid(name: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.into(),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, format!("'{value}' is not a boolean"))),
    }
}
