//! Access/refresh token lifecycle.
//!
//! A session's token moves `Valid -> Expired -> {Valid' | Errored}`. Only one
//! refresh is ever attempted per expiry; `Errored` sticks until the user signs
//! in again.

use std::sync::Arc;

use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use thiserror::Error;

use crate::config::Config;
use crate::error::AppError;
use crate::models::session::{Session, SessionError};
use crate::models::token::TokenResponse;
use crate::models::user::{ProviderProfile, UserLookupResponse};

/// A failed refresh exchange. Every variant is a `RefreshAccessTokenError`.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Session has no refresh token")]
    MissingRefreshToken,

    #[error("Token endpoint unreachable: {0}")]
    Network(String),

    #[error("Token endpoint returned status {status}")]
    Rejected { status: u16 },

    #[error("Malformed token response: {0}")]
    InvalidResponse(String),
}

impl RefreshError {
    /// The tag recorded on the session.
    pub fn tag(&self) -> SessionError {
        SessionError::RefreshAccessTokenError
    }

    /// Whether a later attempt could succeed. Rejections and malformed
    /// responses are fatal for the refresh token that produced them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RefreshError::Network(_))
    }
}

fn network_error(e: reqwest::Error) -> RefreshError {
    if e.is_timeout() {
        RefreshError::Network("request timed out".to_string())
    } else {
        RefreshError::Network(e.without_url().to_string())
    }
}

/// Tokens issued by the authorization-code grant.
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: i64,
}

/// Current time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Absolute expiry of a token issued at `now_ms` that lives `expires_in`
/// seconds. `None` for negative or overflowing lifetimes.
fn expiry_after(now_ms: i64, expires_in: i64) -> Option<i64> {
    if expires_in < 0 {
        return None;
    }
    expires_in
        .checked_mul(1000)
        .and_then(|ms| now_ms.checked_add(ms))
}

/// Whether the access token in `record` is past its expiry at `now_ms`.
///
/// A record without an expiry never expires.
pub fn is_expired(record: &Session, now_ms: i64) -> bool {
    matches!(record.access_token_expires_at, Some(expires_at) if now_ms > expires_at)
}

/// Talks to the provider's token and user endpoints.
#[derive(Clone)]
pub struct TokenManager {
    http: reqwest::Client,
    config: Arc<Config>,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, config: Arc<Config>) -> Self {
        Self { http, config }
    }

    async fn post_token_form(
        &self,
        form: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, RefreshError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(self.config.client_secret.as_str()))
            .form(form)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(network_error)?;

        sonic_rs::from_slice::<TokenResponse>(&body)
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))
    }

    /// Exchanges `record`'s refresh token for a new access token.
    ///
    /// An empty refresh token fails without any network call. The refresh
    /// token is only replaced when the provider sends a new one.
    pub async fn refresh(&self, record: &Session) -> std::result::Result<Session, RefreshError> {
        if record.refresh_token.is_empty() {
            return Err(RefreshError::MissingRefreshToken);
        }

        tracing::info!("🔄 Access token expired, attempting refresh...");

        let tokens = self
            .post_token_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", record.refresh_token.as_str()),
                ("client_id", self.config.client_id.as_str()),
            ])
            .await?;

        let expires_at = expiry_after(now_millis(), tokens.expires_in).ok_or_else(|| {
            RefreshError::InvalidResponse(format!("invalid expires_in {}", tokens.expires_in))
        })?;

        let mut refreshed = record.clone();
        refreshed.access_token = tokens.access_token;
        refreshed.access_token_expires_at = Some(expires_at);
        if let Some(refresh_token) = tokens.refresh_token {
            refreshed.refresh_token = refresh_token;
        }
        refreshed.error = None;

        tracing::info!("✅ Token refresh successful");
        Ok(refreshed)
    }

    /// Applies the once-per-request refresh policy to `record`.
    ///
    /// Returns the record unchanged when it is still valid or already
    /// errored; otherwise the refreshed record, or the record tagged with
    /// `RefreshAccessTokenError` when the refresh failed.
    pub async fn ensure_fresh(&self, record: Session) -> Session {
        if record.error.is_some() || !is_expired(&record, now_millis()) {
            return record;
        }

        match self.refresh(&record).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                tracing::error!(
                    retryable = e.is_retryable(),
                    "❌ Error refreshing token: {}",
                    e
                );
                Session {
                    error: Some(e.tag()),
                    ..record
                }
            }
        }
    }

    /// Redeems an authorization code (PKCE) for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> crate::error::Result<TokenGrant> {
        let redirect_uri = self.config.callback_url();
        let tokens = self
            .post_token_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
                ("code_verifier", code_verifier),
                ("client_id", self.config.client_id.as_str()),
            ])
            .await
            .map_err(|e| AppError::Provider(format!("Code exchange failed: {}", e)))?;

        let expires_at = expiry_after(now_millis(), tokens.expires_in).ok_or_else(|| {
            AppError::Provider(format!(
                "Code exchange failed: invalid expires_in {}",
                tokens.expires_in
            ))
        })?;

        Ok(TokenGrant {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at,
        })
    }

    /// Looks up the signed-in user.
    pub async fn fetch_profile(&self, access_token: &str) -> crate::error::Result<ProviderProfile> {
        let response = self
            .http
            .get(self.config.profile_url())
            .query(&[("user.fields", "profile_image_url")])
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Profile lookup failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Provider(format!(
                "Profile lookup returned status {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::Provider(format!("Profile lookup failed: {}", e.without_url())))?;

        let lookup: UserLookupResponse = sonic_rs::from_slice(&body)
            .map_err(|e| AppError::Provider(format!("Malformed profile response: {}", e)))?;

        Ok(lookup.data.into())
    }
}
