use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    services::banner as banner_service,
    state::AppState,
    validation::banner::validate_apply_banner,
};

/// The response payload for a successful banner application.
#[derive(Serialize)]
pub struct ApplyBannerResponse {
    /// The composited PNG as a data URL.
    pub image: String,
    pub success: bool,
}

/// Applies the ring overlay to the given profile image and pushes it to the
/// provider.
pub async fn apply_banner(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    tracing::info!("API: Received request to /api/applyBanner");

    let request = validate_apply_banner(&body)?;
    tracing::info!(
        "API: Request parameters: token length {}, image host {:?}",
        request.access_token.len(),
        request.profile_image_url.host_str()
    );

    let encoded = banner_service::apply_overlay_and_upload(
        &state,
        &request.access_token,
        request.profile_image_url.as_str(),
    )
    .await?;

    tracing::info!("API: Returning modified image ({} bytes)", encoded.png.len());

    let response = ApplyBannerResponse {
        image: encoded.data_url(),
        success: true,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Fallback for methods a route does not accept.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
