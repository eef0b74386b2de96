// Life of a request:
// 1. The request-tracing middleware assigns a request id
// 2. The gate (on protected routes) turns the bearer token or session
//    cookie into a Session via the configured Authenticator
// 3. The handler runs against the Auth service:
//     - Password logins check credentials against the user registry
//     - OAuth2 logins bounce through the provider and come back to the
//       callback with the signed flow-state cookie
//     - Successful logins mint a session token, set the cookie and answer
//       with the user
//
// System components:
//  - SQLite user registry
//  - Session token issuer
//  - OAuth2 providers
//  - Federated authenticators (Firebase, Supabase)

pub mod auth;
pub mod authenticator;
pub mod config;
pub mod error;
pub mod federated;
pub mod identity;
pub mod password;
pub mod providers;
pub mod store;
pub mod token;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod testing;

pub use auth::{Auth, AuthConfig, router};
pub use error::{Error, ErrorKind, Result};
