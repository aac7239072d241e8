use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::user::ProviderProfile;

/// Tag recorded on a session whose token refresh failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionError {
    RefreshAccessTokenError,
}

/// The token record held in a user session.
///
/// Lives only in the session store (sealed) and is destroyed on sign-out or
/// expiry. `Debug` never prints token values.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer credential for the provider API.
    pub access_token: String,
    /// Credential exchanged for a new access token. Empty if none was granted.
    pub refresh_token: String,
    /// Absolute access-token expiry in milliseconds since the epoch.
    pub access_token_expires_at: Option<i64>,
    /// Identifier of the provider that issued the tokens.
    pub provider: String,
    /// Set once a refresh attempt has failed; terminal for this token.
    pub error: Option<SessionError>,
    /// The signed-in user's provider profile.
    pub user: ProviderProfile,
    /// Token the client must echo in `x-csrf-token` for state-changing calls.
    pub csrf_token: String,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("provider", &self.provider)
            .field("error", &self.error)
            .field("user", &self.user)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// State kept between the sign-in redirect and the provider callback.
#[derive(Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// PKCE code verifier whose challenge was sent to the provider.
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) fn sample_session(access_token_expires_at: Option<i64>) -> Session {
    Session {
        access_token: "access-secret".to_string(),
        refresh_token: "refresh-secret".to_string(),
        access_token_expires_at,
        provider: crate::config::PROVIDER.to_string(),
        error: None,
        user: ProviderProfile {
            id: "42".to_string(),
            name: "Ada".to_string(),
            image: Some("https://pbs.example/ada.png".to_string()),
        },
        csrf_token: "csrf-token".to_string(),
        created_at: Utc::now(),
        expires_at: Utc::now() + chrono::Duration::days(30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_tokens() {
        let rendered = format!("{:?}", sample_session(Some(1)));
        assert!(!rendered.contains("access-secret"));
        assert!(!rendered.contains("refresh-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn error_tag_serializes_by_name() {
        let json = sonic_rs::to_string(&SessionError::RefreshAccessTokenError).unwrap();
        assert_eq!(json, r#""RefreshAccessTokenError""#);
    }
}
