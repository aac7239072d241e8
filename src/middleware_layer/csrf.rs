use axum::{
    body::Body,
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    http::Method,
};

use crate::{crypto::csrf::tokens_match, error::AppError, middleware_layer::auth::ActiveSession};

/// Header the client echoes the session's CSRF token in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// A middleware that verifies the CSRF token against the active session.
///
/// Must run after [`require_session`](crate::middleware_layer::auth::require_session).
/// Safe methods are exempt.
pub async fn verify_csrf(req: Request<Body>, next: Next) -> Response {
    if req.method() == Method::GET
        || req.method() == Method::HEAD
        || req.method() == Method::OPTIONS
    {
        tracing::debug!("✅ CSRF exemption: {} request", req.method());
        return next.run(req).await;
    }

    let Some(active) = req.extensions().get::<ActiveSession>() else {
        tracing::warn!("❌ CSRF: no active session");
        return AppError::Authentication("Not signed in".to_string()).into_response();
    };

    let provided = match req.headers().get(CSRF_HEADER) {
        Some(token) => match token.to_str() {
            Ok(t) => t,
            Err(_) => {
                tracing::warn!("❌ CSRF: header has invalid format");
                return AppError::Authentication("Invalid CSRF token format".to_string())
                    .into_response();
            }
        },
        None => {
            tracing::warn!("❌ CSRF: x-csrf-token header missing");
            return AppError::Authentication("Missing CSRF token header".to_string())
                .into_response();
        }
    };

    if !tokens_match(&active.session.csrf_token, provided) {
        tracing::warn!("❌ CSRF: token mismatch");
        return AppError::Authentication("CSRF token mismatch".to_string()).into_response();
    }

    tracing::debug!("✅ CSRF token valid");
    next.run(req).await
}
