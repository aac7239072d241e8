use base64::{Engine as _, engine::general_purpose};
use sha2::{Digest, Sha256};

/// The only challenge method sent to the provider.
pub const CHALLENGE_METHOD: &str = "S256";

/// Derives the S256 code challenge for a PKCE code verifier.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}
