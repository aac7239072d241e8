use serde::Deserialize;

use crate::error::{AppError, Result};

/// Longest URL accepted for the source image.
const MAX_URL_LENGTH: usize = 2048;
/// Longest bearer token accepted.
const MAX_TOKEN_LENGTH: usize = 4096;

/// `POST /api/applyBanner` body. Fields are optional so that missing ones
/// produce a 400 rather than a deserialization rejection.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApplyBannerRequest {
    pub access_token: Option<String>,
    pub profile_image_url: Option<String>,
}

/// A request that passed validation.
pub struct ValidatedBannerRequest {
    pub access_token: String,
    pub profile_image_url: url::Url,
}

/// Parses and validates the raw request body.
pub fn validate_apply_banner(body: &[u8]) -> Result<ValidatedBannerRequest> {
    let request: ApplyBannerRequest = if body.is_empty() {
        ApplyBannerRequest::default()
    } else {
        sonic_rs::from_slice(body)
            .map_err(|_| AppError::Validation("Malformed request body".to_string()))?
    };

    let access_token = request.access_token.filter(|t| !t.trim().is_empty());
    let profile_image_url = request.profile_image_url.filter(|u| !u.trim().is_empty());

    let (Some(access_token), Some(profile_image_url)) = (access_token, profile_image_url) else {
        return Err(AppError::Validation("Missing required parameters".to_string()));
    };

    if access_token.len() > MAX_TOKEN_LENGTH {
        return Err(AppError::Validation("Access token is too long".to_string()));
    }

    if profile_image_url.len() > MAX_URL_LENGTH {
        return Err(AppError::Validation("Profile image URL is too long".to_string()));
    }

    let url = url::Url::parse(profile_image_url.trim())
        .map_err(|_| AppError::Validation("Profile image URL is invalid".to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::Validation(
            "Profile image URL must use http or https".to_string(),
        ));
    }

    if url.host_str().is_none() {
        return Err(AppError::Validation("Profile image URL has no host".to_string()));
    }

    Ok(ValidatedBannerRequest {
        access_token,
        profile_image_url: url,
    })
}
