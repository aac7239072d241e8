use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tower_cookies::{Cookies, Key};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::Session,
    state::AppState,
};

/// Name of the signed cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session_id";

/// The caller's session, inserted into request extensions by [`require_session`].
#[derive(Clone, Debug)]
pub struct ActiveSession {
    pub id: Uuid,
    pub session: Session,
}

/// Extracts the session id from the signed session cookie.
///
/// # Arguments
///
/// * `cookies` - The request cookies.
/// * `key` - The cookie-signing key.
///
/// # Returns
///
/// An `Option` containing the session ID if the cookie is present and its
/// signature verifies.
fn extract_session_id(cookies: &Cookies, key: &Key) -> Option<Uuid> {
    cookies
        .signed(key)
        .get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// A middleware that requires a valid session to be present.
///
/// Loads the session, applies the token refresh policy (at most one refresh
/// attempt per request) and persists the record if the refresh changed it.
pub async fn require_session(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    tracing::debug!("🔐 Checking session...");

    let session_id = extract_session_id(&cookies, &state.cookie_key).ok_or_else(|| {
        AppError::Authentication("Not signed in".to_string())
    })?;

    let session = state
        .sessions
        .load_session(session_id)
        .await?
        .ok_or_else(|| AppError::Authentication("Session not found".to_string()))?;

    if chrono::Utc::now() > session.expires_at {
        tracing::warn!("❌ Session expired for user: {}", session.user.id);
        state.sessions.delete_session(session_id).await.unwrap_or(());
        return Err(AppError::Authentication("Session expired".to_string()));
    }

    let previous_expiry = session.access_token_expires_at;
    let previous_error = session.error;
    let session = state.tokens.ensure_fresh(session).await;

    if session.access_token_expires_at != previous_expiry || session.error != previous_error {
        state.sessions.save_session(session_id, &session).await?;
    }

    tracing::debug!("✅ Session loaded for user: {}", session.user.id);

    request.extensions_mut().insert(ActiveSession {
        id: session_id,
        session,
    });

    Ok(next.run(request).await)
}
