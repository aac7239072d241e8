use rand::RngCore;
use rand::rngs::OsRng;
use base64::{Engine as _, engine::general_purpose};
use subtle::ConstantTimeEq;

/// The size of random tokens in bytes.
const TOKEN_SIZE: usize = 32;

/// Generates a new random token (CSRF token, OAuth `state`, PKCE verifier).
///
/// # Returns
///
/// A URL-safe base64-encoded token of 43 characters.
pub fn generate_token() -> String {
    let mut token = [0u8; TOKEN_SIZE];
    OsRng.fill_bytes(&mut token);

    general_purpose::URL_SAFE_NO_PAD.encode(token)
}

/// Compares two tokens in constant time.
pub fn tokens_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
