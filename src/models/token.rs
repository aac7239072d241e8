use serde::Deserialize;

/// Token endpoint response for both the code and refresh grants.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Present when the provider rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}
