//! Authenticators backed by external identity services.
//!
//! Selected at startup in place of the local [`crate::token::TokenIssuer`]:
//! - [`FirebaseAuth`]: verifies Firebase ID tokens against Google's keys.
//! - [`SupabaseAuth`]: asks a Supabase project to resolve the token.

mod firebase;
mod key_source;
mod supabase;

pub use firebase::{FIREBASE_JWKS_URL, FIREBASE_KEY_KIND, FirebaseAuth};
pub use key_source::{DEFAULT_KEYS_TTL, KeySource, MAX_KEYS_TTL, parse_max_age};
pub use supabase::SupabaseAuth;
