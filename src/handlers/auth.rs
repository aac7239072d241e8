use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::{
    config::PROVIDER,
    crypto::{csrf::generate_token, pkce},
    error::{AppError, Result},
    middleware_layer::auth::{ActiveSession, SESSION_COOKIE},
    models::session::{PendingAuthorization, Session, SessionError},
    models::user::ProviderProfile,
    state::AppState,
};

/// Name of the cookie exposing the CSRF token to the client.
pub const CSRF_COOKIE: &str = "csrf_token";

/// Query parameters the provider sends to the callback.
#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// The response payload for `GET /api/auth/session`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: ProviderProfile,
    pub access_token: String,
    pub error: Option<SessionError>,
    /// Access token expiry as RFC 3339.
    pub expires: Option<String>,
}

/// The response payload for sign-out.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// Creates a cookie with the given name, value, and max age.
fn create_secure_cookie(
    name: &'static str,
    value: String,
    max_age_days: i64,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);

    if name != CSRF_COOKIE {
        cookie.set_http_only(true);
    }

    if secure {
        cookie.set_secure(true);
    }

    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::seconds(max_age_days * 86400));
    cookie.set_path("/");

    cookie
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_max_age(Duration::seconds(0));
    cookie.set_path("/");
    cookie
}

/// Starts the OAuth flow: stores a PKCE verifier under a fresh `state` and
/// redirects to the provider.
pub async fn sign_in(State(state): State<AppState>) -> Result<Redirect> {
    let config = &state.config;
    if !config.is_oauth_configured() {
        return Err(AppError::NotConfigured);
    }

    let oauth_state = generate_token();
    let code_verifier = generate_token();
    let challenge = pkce::code_challenge(&code_verifier);

    state
        .sessions
        .save_pending(
            &oauth_state,
            &PendingAuthorization {
                code_verifier,
                created_at: Utc::now(),
            },
        )
        .await?;

    let redirect_uri = config.callback_url();
    let authorize_url = url::Url::parse_with_params(
        &config.authorize_url,
        &[
            ("response_type", "code"),
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", config.scopes.as_str()),
            ("state", oauth_state.as_str()),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", pkce::CHALLENGE_METHOD),
        ],
    )
    .map_err(|e| AppError::Internal(format!("Invalid authorize URL: {}", e)))?;

    tracing::info!("🔐 Redirecting to {} authorization (callback: {})", PROVIDER, redirect_uri);
    Ok(Redirect::to(authorize_url.as_str()))
}

/// Completes the OAuth flow and creates the session.
#[axum::debug_handler]
pub async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    if let Some(error) = query.error {
        return Err(AppError::Authentication(format!(
            "Authorization denied by provider: {}",
            error
        )));
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(AppError::Validation("Missing code or state".to_string()));
    };

    let pending = state
        .sessions
        .take_pending(&oauth_state)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid or expired OAuth state".to_string()))?;

    let grant = state
        .tokens
        .exchange_code(&code, &pending.code_verifier)
        .await?;
    let user = state.tokens.fetch_profile(&grant.access_token).await?;

    tracing::info!(
        "✅ Sign-in: user {} (refresh token: {})",
        user.id,
        grant.refresh_token.is_some()
    );

    let now = Utc::now();
    let session = Session {
        access_token: grant.access_token,
        refresh_token: grant.refresh_token.unwrap_or_default(),
        access_token_expires_at: Some(grant.expires_at),
        provider: PROVIDER.to_string(),
        error: None,
        user,
        csrf_token: generate_token(),
        created_at: now,
        expires_at: now + chrono::Duration::days(state.config.session_duration_days),
    };

    let session_id = Uuid::new_v4();
    state.sessions.save_session(session_id, &session).await?;

    let days = state.config.session_duration_days;
    let secure = state.config.secure_cookies;
    cookies.signed(&state.cookie_key).add(create_secure_cookie(
        SESSION_COOKIE,
        session_id.to_string(),
        days,
        secure,
    ));
    cookies.add(create_secure_cookie(
        CSRF_COOKIE,
        session.csrf_token.clone(),
        days,
        secure,
    ));
    tracing::info!("✅ Session cookie added: session_id={}", session_id);

    Ok(Redirect::to("/").into_response())
}

/// Returns the current session, refreshed if its access token had expired.
pub async fn session(Extension(active): Extension<ActiveSession>) -> Json<SessionResponse> {
    let session = active.session;
    let expires = session
        .access_token_expires_at
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|at| at.to_rfc3339());

    tracing::debug!(
        "Session for user {} (expires: {:?}, error: {:?})",
        session.user.id,
        expires,
        session.error
    );

    Json(SessionResponse {
        user: session.user,
        access_token: session.access_token,
        error: session.error,
        expires,
    })
}

/// Destroys the session and clears its cookies.
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(active): Extension<ActiveSession>,
    cookies: Cookies,
) -> Result<Response> {
    tracing::info!("👋 Sign-out for user: {}", active.session.user.id);

    state.sessions.delete_session(active.id).await?;

    cookies
        .signed(&state.cookie_key)
        .remove(expired_cookie(SESSION_COOKIE));
    cookies.remove(expired_cookie(CSRF_COOKIE));

    let response = AuthResponse {
        success: true,
        message: "Signed out".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
