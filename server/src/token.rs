//! Session token issuance and verification.
//!
//! Session tokens are JWTs signed with HMAC-SHA-512 over the server secret.
//! Their claims are enough to rebuild the whole [`Session`], so nothing is
//! stored server-side.
//!
//! # Pre-conditions
//! - The signing secret is non-empty.
//!
//! # Post-conditions
//! - `restore_session(create_session(user).token)` yields the same user id and
//!   kind until the token expires.
//!
//! # Invariants
//! - Verification only accepts HMAC algorithms.
//! - Every verification failure is reported as `MissingAuth` with code
//!   `invalid_token`; the reason only appears in the hint.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::{Session, User, random::rand_alnum};

/// Session lifetime used when none is configured.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Length of the random session id.
const SESSION_ID_LEN: usize = 12;

/// Claims carried by a session token.
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// Session id.
    tid: String,
    /// Kind of the user.
    kind: String,
    /// User id.
    sub: String,
    iat: i64,
    exp: i64,
}

impl SessionClaims {
    fn validate(&self) -> Result<()> {
        if self.sub.is_empty() || self.kind.is_empty() {
            return Err(invalid_token("sub and kind claims must be set"));
        }
        if self.iat >= self.exp {
            return Err(invalid_token("token was issued after its expiry"));
        }
        Ok(())
    }
}

/// Creates and verifies session tokens.
///
/// Cheap to clone: the secret is shared.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Arc<[u8]>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create an issuer.
    ///
    /// # Arguments
    /// * `secret` - HMAC signing secret.
    /// * `ttl` - Session lifetime; zero falls back to [`DEFAULT_SESSION_TTL`].
    ///
    /// # Errors
    /// Returns `InvalidInput` if the secret is empty.
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::invalid_input()
                .coded("invalid_secret")
                .hint("signing secret must not be empty"));
        }

        let ttl = if ttl.is_zero() { DEFAULT_SESSION_TTL } else { ttl };
        Ok(Self {
            secret: Arc::from(secret),
            ttl,
        })
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a new session for `user`.
    ///
    /// # Errors
    /// Returns `InternalIssue` if the token cannot be signed.
    pub fn create_session(&self, user: &User) -> Result<Session> {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| Error::internal().caused_by(e).hint("session ttl out of range"))?;
        let expires_at = created_at + ttl;

        let claims = SessionClaims {
            tid: rand_alnum(SESSION_ID_LEN),
            kind: user.kind.clone(),
            sub: user.id.clone(),
            iat: created_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| Error::internal().caused_by(e).hint("signing session token"))?;

        Ok(Session {
            id: claims.tid,
            token,
            user_id: claims.sub,
            user_kind: claims.kind,
            created_at: timestamp(claims.iat)?,
            expires_at: timestamp(claims.exp)?,
        })
    }

    /// Verify `token` and rebuild its session.
    ///
    /// # Errors
    /// Returns `MissingAuth` (code `invalid_token`) if the token is empty,
    /// malformed, signed with a non-HMAC algorithm or another secret, expired,
    /// or carries claims that are not valid.
    pub fn restore_session(&self, token: &str) -> Result<Session> {
        if token.is_empty() {
            return Err(invalid_token("token is empty"));
        }

        let mut validation = Validation::new(Algorithm::HS512);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<SessionClaims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map_err(map_jwt_error)?;
        let claims = data.claims;
        claims.validate()?;

        Ok(Session {
            id: claims.tid,
            token: token.to_string(),
            user_id: claims.sub,
            user_kind: claims.kind,
            created_at: timestamp(claims.iat).map_err(|_| invalid_token("iat out of range"))?,
            expires_at: timestamp(claims.exp).map_err(|_| invalid_token("exp out of range"))?,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::internal().hint(format!("timestamp {secs} out of range")))
}

pub(crate) fn invalid_token(hint: impl Into<String>) -> Error {
    Error::missing_auth().coded("invalid_token").hint(hint)
}

/// Maps jsonwebtoken errors to an `invalid_token` error with a useful hint.
pub(crate) fn map_jwt_error(error: jsonwebtoken::errors::Error) -> Error {
    use jsonwebtoken::errors::ErrorKind;

    let hint = match error.kind() {
        ErrorKind::InvalidSignature => "signature mismatch",
        ErrorKind::ExpiredSignature => "token expired",
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => "algorithm not allowed",
        ErrorKind::MissingRequiredClaim(_) => "required claim missing",
        ErrorKind::InvalidIssuer => "issuer mismatch",
        ErrorKind::InvalidAudience => "audience mismatch",
        ErrorKind::ImmatureSignature => "token not yet valid",
        _ => "malformed token",
    };
    invalid_token(hint)
}
