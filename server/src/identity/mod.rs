//! Identity model: users, login keys and sessions.

mod key;
pub mod random;
mod session;
mod user;

pub use key::{
    KEY_KIND_EMAIL, KEY_KIND_ID, KEY_KIND_USERNAME, KEY_SEPARATOR, Key, KeyAttributes,
    new_auth_key, split_auth_key, validate_auth_key,
};
pub use session::Session;
pub use user::{
    DEFAULT_USER_KIND, USER_ID_LEN, User, UserAttributes, UserData, VERIFY_TOKEN_LEN,
    is_valid_email, is_valid_username,
};
