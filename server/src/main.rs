// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden::auth::Auth;
use warden::authenticator::Authenticator;
use warden::config::{AuthBackend, ServerConfig};
use warden::federated::{FirebaseAuth, SupabaseAuth};
use warden::providers::{self, Provider};
use warden::store::{SqliteRegistry, UserRegistry};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: database_path={}, listen_port={}, base_url={}",
        config.database_path.display(),
        config.listen_port,
        config.base_url
    );

    // Pre-condition: the parent directory of the database exists.
    if let Some(dir) = config.database_path.parent()
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        tracing::error!("Failed to create data directory: {e}");
        std::process::exit(1);
    }

    let registry = match SqliteRegistry::open(&config.database_path) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!("Failed to open user database: {e}");
            std::process::exit(1);
        }
    };
    let registry: Arc<dyn UserRegistry> = Arc::new(registry);

    let auth = match build_auth(&config, registry) {
        Ok(auth) => auth,
        Err(e) => {
            tracing::error!("Failed to set up authentication: {e}");
            std::process::exit(1);
        }
    };

    let app = warden::router(Arc::new(auth));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind: {e}");
            std::process::exit(1);
        });

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });
}

/// Assemble the auth service: token backend plus enabled OAuth2 providers.
fn build_auth(config: &ServerConfig, registry: Arc<dyn UserRegistry>) -> warden::Result<Auth> {
    let mut auth = Auth::new(config.auth.clone(), Arc::clone(&registry))?;

    let authenticator: Option<Arc<dyn Authenticator>> = match &config.backend {
        AuthBackend::Local => None,
        AuthBackend::Firebase { project_id } => Some(Arc::new(
            FirebaseAuth::new(project_id.as_str()).with_registry(registry, config.auth.default_kind()),
        )),
        AuthBackend::Supabase { url, api_key } => {
            Some(Arc::new(SupabaseAuth::new(url, api_key.as_str())))
        }
    };
    if let Some(authenticator) = authenticator {
        tracing::info!("Token backend: {}", config.backend.name());
        auth = auth.with_authenticator(authenticator);
    }

    let callback_url = config.oauth2_callback_url();
    if let Some(credentials) = &config.github {
        let provider: Arc<dyn Provider> = Arc::new(providers::github(credentials, &callback_url)?);
        auth = auth.with_provider(provider);
    }
    if let Some(credentials) = &config.google {
        let provider: Arc<dyn Provider> = Arc::new(providers::google(credentials, &callback_url)?);
        auth = auth.with_provider(provider);
    }

    Ok(auth)
}
