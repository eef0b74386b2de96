//! Authenticated sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A verified session.
///
/// Sessions are not stored anywhere: everything here is reconstructed from
/// the signed claims of `token` on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub token: String,
    pub user_id: String,
    pub user_kind: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Returns true if the session has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
