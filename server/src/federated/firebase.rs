//! Firebase ID-token verification.
//!
//! # Invariants
//! - Only RS256 tokens whose `kid` names a current Google signing key are
//!   accepted.
//! - `iss` must be `https://securetoken.google.com/<project>` and `aud` the
//!   project id.
//! - With a registry attached, the session's user id is the local user linked
//!   through the `firebase/<sub>` login key; otherwise it is the Firebase uid.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;

use super::key_source::KeySource;
use crate::authenticator::Authenticator;
use crate::error::{Error, ErrorKind, Result};
use crate::identity::random::rand_alnum;
use crate::identity::{DEFAULT_USER_KIND, Key, KeyAttributes, Session, User, UserData, new_auth_key};
use crate::store::UserRegistry;
use crate::token::{invalid_token, map_jwt_error};

/// Google's JWKS endpoint for Firebase ID tokens.
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Login key kind linking local users to Firebase accounts.
pub const FIREBASE_KEY_KIND: &str = "firebase";

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    iat: i64,
    exp: i64,
    #[serde(default)]
    email: String,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Verifies Firebase ID tokens.
pub struct FirebaseAuth {
    project_id: String,
    keys: KeySource,
    registry: Option<Arc<dyn UserRegistry>>,
    user_kind: String,
}

impl FirebaseAuth {
    /// Verifier for `project_id` using Google's published keys.
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            keys: KeySource::new(FIREBASE_JWKS_URL),
            registry: None,
            user_kind: DEFAULT_USER_KIND.to_string(),
        }
    }

    #[must_use]
    pub fn with_key_source(mut self, keys: KeySource) -> Self {
        self.keys = keys;
        self
    }

    /// Link Firebase accounts to local users of kind `user_kind`.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn UserRegistry>, user_kind: &str) -> Self {
        self.registry = Some(registry);
        self.user_kind = user_kind.to_string();
        self
    }

    fn issuer(&self) -> String {
        format!("{ISSUER_PREFIX}{}", self.project_id)
    }

    async fn verify(&self, token: &str) -> Result<FirebaseClaims> {
        if token.is_empty() {
            return Err(invalid_token("token is empty"));
        }

        let header = decode_header(token).map_err(map_jwt_error)?;
        if header.alg != Algorithm::RS256 {
            return Err(invalid_token(format!("algorithm {:?} not allowed", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| invalid_token("token header has no kid"))?;

        let jwk = self.keys.find(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| Error::internal().caused_by(e).hint(format!("signing key '{kid}' is unusable")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer()]);
        validation.set_audience(&[&self.project_id]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let claims = decode::<FirebaseClaims>(token, &key, &validation)
            .map_err(map_jwt_error)?
            .claims;
        if claims.sub.is_empty() {
            return Err(invalid_token("sub claim is empty"));
        }
        Ok(claims)
    }

    /// Resolve the local user of a Firebase account, registering it on first
    /// sight.
    ///
    /// A Firebase account is never linked to an existing user by email: when
    /// the email is taken the token is refused with `MissingAuth`
    /// (`email_taken`).
    async fn local_user(&self, registry: &dyn UserRegistry, claims: &FirebaseClaims) -> Result<User> {
        let login_key = new_auth_key(FIREBASE_KEY_KIND, &claims.sub);
        match registry.get(&login_key).await {
            Ok(user) => return Ok(user),
            Err(e) if e.is(ErrorKind::NotFound) => {}
            Err(e) => return Err(Error::internal().caused_by(e)),
        }

        let mut user = User::new(&self.user_kind, "", &claims.email);
        user.data = profile_data(claims);
        if claims.email_verified {
            user.verified_at = Some(Utc::now());
            user.verify_token = None;
        }
        user.validate()?;

        let mut attribs = KeyAttributes::new();
        attribs.insert("user_id".to_string(), claims.sub.clone().into());
        let key = Key::new(login_key.clone(), attribs);

        match registry.register(user, vec![key]).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "registered user from firebase login");
                Ok(user)
            }
            // Either a concurrent first login won the race, or the email
            // belongs to another account. Only the former has the key.
            Err(e) if e.is(ErrorKind::Conflict) => match registry.get(&login_key).await {
                Ok(user) => Ok(user),
                Err(lookup) if lookup.is(ErrorKind::NotFound) => Err(Error::missing_auth()
                    .coded("email_taken")
                    .caused_by(e)
                    .hint(format!("email of firebase account '{}' belongs to another user", claims.sub))),
                Err(lookup) => Err(Error::internal().caused_by(lookup)),
            },
            Err(e) => Err(Error::internal().caused_by(e)),
        }
    }
}

impl std::fmt::Debug for FirebaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAuth")
            .field("project_id", &self.project_id)
            .field("keys", &self.keys.url())
            .field("registry", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for FirebaseAuth {
    async fn authenticate(&self, token: &str) -> Result<Session> {
        let claims = self.verify(token).await?;

        let (user_id, user_kind) = match &self.registry {
            Some(registry) => {
                let user = self.local_user(registry.as_ref(), &claims).await?;
                (user.id, user.kind)
            }
            None => (claims.sub.clone(), self.user_kind.clone()),
        };

        Ok(Session {
            id: rand_alnum(12),
            token: token.to_string(),
            user_id,
            user_kind,
            created_at: timestamp(claims.iat)?,
            expires_at: timestamp(claims.exp)?,
        })
    }
}

fn profile_data(claims: &FirebaseClaims) -> UserData {
    let mut data = UserData::new();
    if let Some(name) = &claims.name {
        data.insert("name".to_string(), name.clone().into());
    }
    if let Some(picture) = &claims.picture {
        data.insert("picture".to_string(), picture.clone().into());
    }
    data
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| invalid_token(format!("timestamp {secs} out of range")))
}
