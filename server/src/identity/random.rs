//! Random string generation for ids, usernames and one-shot tokens.

use rand::Rng;

/// Lower and upper case ASCII letters and digits.
pub const CHARSET_ALPHANUMERIC: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// ASCII digits.
pub const CHARSET_DIGITS: &[u8] = b"0123456789";

/// Generate a random string of `len` characters drawn from `charset`.
///
/// Uses the thread-local CSPRNG, so the output is suitable for secrets such
/// as verification tokens and OAuth2 state values.
///
/// # Pre-conditions
/// - `charset` is non-empty ASCII.
#[must_use]
pub fn rand_str(len: usize, charset: &[u8]) -> String {
    if charset.is_empty() {
        return String::new();
    }
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(charset[rng.random_range(0..charset.len())]))
        .collect()
}

/// Shorthand for an alphanumeric random string.
#[must_use]
pub fn rand_alnum(len: usize) -> String {
    rand_str(len, CHARSET_ALPHANUMERIC)
}
