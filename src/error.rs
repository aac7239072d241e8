use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Missing or malformed request input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No usable session, bad OAuth state or CSRF failure.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The provider rejected the bearer token.
    #[error("Provider rejected the access token")]
    Unauthorized { details: Option<String> },

    /// Fetching, decoding or encoding the profile image failed.
    #[error("Image processing failed: {0}")]
    ProcessingFailed(String),

    /// The provider failed during sign-in (code exchange or profile lookup).
    #[error("Provider error: {0}")]
    Provider(String),

    /// OAuth client credentials are missing.
    #[error("OAuth provider is not configured")]
    NotConfigured,

    /// The route exists but not for this method.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Session store error".to_string(), None)
            }

            AppError::Validation(msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg, None)
            }

            AppError::Authentication(msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg, None)
            }

            AppError::Unauthorized { details } => {
                tracing::warn!("Provider rejected access token");
                (
                    StatusCode::UNAUTHORIZED,
                    "Unauthorized: Your Twitter session has expired. Please sign in again."
                        .to_string(),
                    details,
                )
            }

            AppError::ProcessingFailed(cause) => {
                tracing::error!("Image processing failed: {}", cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error processing image".to_string(),
                    Some(cause),
                )
            }

            AppError::Provider(msg) => {
                tracing::error!("Provider error: {}", msg);
                (StatusCode::BAD_GATEWAY, "OAuth provider error".to_string(), Some(msg))
            }

            AppError::NotConfigured => {
                tracing::error!("OAuth client credentials are not configured");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "OAuth provider is not configured".to_string(),
                    None,
                )
            }

            AppError::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string(), None)
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Encryption error".to_string(), None)
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
            }
        };

        let body = sonic_rs::to_string(&ErrorBody {
            error: message,
            details,
        })
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
