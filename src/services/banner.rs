use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose};
use image::{ImageFormat, ImageReader, Limits, RgbaImage};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use thiserror::Error;

use crate::compositor;
use crate::error::AppError;
use crate::state::AppState;

/// The PNG produced for the user.
pub struct EncodedImage {
    pub png: Vec<u8>,
}

impl EncodedImage {
    /// `data:image/png;base64,...`
    pub fn data_url(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&self.png)
        )
    }
}

/// Why applying the overlay failed.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The provider rejected the bearer token; the user must sign in again.
    #[error("Provider rejected the access token")]
    Unauthorized { details: Option<String> },

    /// The source image could not be fetched, decoded or encoded.
    #[error("{0}")]
    ProcessingFailed(String),
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Unauthorized { details } => AppError::Unauthorized { details },
            DispatchError::ProcessingFailed(cause) => AppError::ProcessingFailed(cause),
        }
    }
}

#[derive(Serialize)]
struct ProfileImageUpdate<'a> {
    profile_image: &'a str,
}

/// Outcome of the single upload attempt.
enum UploadOutcome {
    Accepted,
    Unauthorized(Option<String>),
    Failed(String),
}

fn fetch_error(state: &AppState, e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        tracing::warn!(
            "⏱️ Image fetch timed out after {}s",
            state.config.http_timeout_secs
        );
        DispatchError::ProcessingFailed("Timed out fetching image".to_string())
    } else {
        DispatchError::ProcessingFailed(format!("Failed to fetch image: {}", e))
    }
}

/// Downloads the source image, enforcing the configured size limit.
async fn fetch_source_image(state: &AppState, source_url: &str) -> Result<Vec<u8>, DispatchError> {
    let mut response = state
        .http
        .get(source_url)
        .send()
        .await
        .map_err(|e| fetch_error(state, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DispatchError::ProcessingFailed(format!(
            "Failed to fetch image: status {}",
            status.as_u16()
        )));
    }

    let limit = state.config.max_image_bytes;
    if response.content_length().is_some_and(|len| len as usize > limit) {
        return Err(DispatchError::ProcessingFailed(format!(
            "Image exceeds {} bytes",
            limit
        )));
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| fetch_error(state, e))?
    {
        if bytes.len() + chunk.len() > limit {
            return Err(DispatchError::ProcessingFailed(format!(
                "Image exceeds {} bytes",
                limit
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Decoder limits derived from the configuration.
fn decode_limits(state: &AppState) -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(state.config.max_image_dimension);
    limits.max_image_height = Some(state.config.max_image_dimension);
    limits.max_alloc = Some(state.config.max_decode_bytes);
    limits
}

/// Decodes, composites and re-encodes as PNG. CPU-bound.
fn render_banner(bytes: &[u8], limits: Limits) -> Result<Vec<u8>, DispatchError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DispatchError::ProcessingFailed(format!("Failed to read image: {}", e)))?;
    reader.limits(limits);

    let source: RgbaImage = reader
        .decode()
        .map_err(|e| DispatchError::ProcessingFailed(format!("Failed to decode image: {}", e)))?
        .to_rgba8();
    tracing::debug!(
        "✅ Decoded image {}x{}",
        source.width(),
        source.height()
    );

    let output = compositor::composite(&source);

    let mut png = Vec::new();
    output
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| DispatchError::ProcessingFailed(format!("Failed to encode image: {}", e)))?;

    Ok(png)
}

async fn upload_profile_image(state: &AppState, access_token: &str, data_url: &str) -> UploadOutcome {
    let body = match sonic_rs::to_string(&ProfileImageUpdate {
        profile_image: data_url,
    }) {
        Ok(body) => body,
        Err(e) => return UploadOutcome::Failed(format!("Serialization failed: {}", e)),
    };

    let response = match state
        .http
        .post(state.config.profile_url())
        .header(AUTHORIZATION, format!("Bearer {}", access_token))
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            return UploadOutcome::Failed(format!(
                "timed out after {}s",
                state.config.http_timeout_secs
            ));
        }
        Err(e) => return UploadOutcome::Failed(e.without_url().to_string()),
    };

    let status = response.status();
    if status.is_success() {
        return UploadOutcome::Accepted;
    }

    let details = response.text().await.ok().filter(|text| !text.is_empty());
    if status == StatusCode::UNAUTHORIZED {
        UploadOutcome::Unauthorized(details)
    } else {
        UploadOutcome::Failed(format!(
            "status {}: {}",
            status.as_u16(),
            details.unwrap_or_default()
        ))
    }
}

/// Fetches the image at `source_url`, applies the ring overlay and pushes the
/// result to the provider.
///
/// The upload is best effort: any failure other than a 401 is logged and the
/// locally produced image is still returned. A 401 discards the image and
/// yields [`DispatchError::Unauthorized`].
pub async fn apply_overlay_and_upload(
    state: &AppState,
    access_token: &str,
    source_url: &str,
) -> Result<EncodedImage, DispatchError> {
    tracing::info!("📥 Fetching profile image...");
    let bytes = fetch_source_image(state, source_url).await?;

    if !infer::is_image(&bytes) {
        return Err(DispatchError::ProcessingFailed(
            "Fetched content is not an image".to_string(),
        ));
    }

    let png = {
        let _permit = state
            .composite_limiter
            .acquire()
            .await
            .map_err(|e| DispatchError::ProcessingFailed(e.to_string()))?;

        tracing::info!("🎨 Compositing overlay ({} bytes)...", bytes.len());
        let limits = decode_limits(state);
        tokio::task::spawn_blocking(move || render_banner(&bytes, limits))
            .await
            .map_err(|e| DispatchError::ProcessingFailed(format!("Render task failed: {}", e)))??
    };

    let encoded = EncodedImage { png };
    let data_url = encoded.data_url();

    tracing::info!("📤 Uploading profile image to provider...");
    match upload_profile_image(state, access_token, &data_url).await {
        UploadOutcome::Accepted => {
            tracing::info!("✅ Provider accepted profile image");
        }
        UploadOutcome::Unauthorized(details) => {
            tracing::warn!("❌ Provider rejected access token (401)");
            return Err(DispatchError::Unauthorized { details });
        }
        UploadOutcome::Failed(reason) => {
            tracing::warn!("⚠️ Profile image upload failed, returning local image: {}", reason);
        }
    }

    Ok(encoded)
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .expect("encode fixture");
    png
}
