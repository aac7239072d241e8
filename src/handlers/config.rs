use axum::{extract::State, Json};
use serde::Serialize;

use crate::{config::PROVIDER, state::AppState};

/// Non-secret view of the OAuth configuration.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub provider: &'static str,
    pub client_id: String,
    pub oauth_version: &'static str,
    pub configured_url: String,
    pub callback_url: String,
    pub requested_scopes: String,
    pub is_configured: bool,
}

#[derive(Serialize)]
pub struct TestConfigResponse {
    pub success: bool,
    pub config: ConfigSummary,
    pub recommendations: [&'static str; 3],
}

/// First five characters of the client id, never the whole value.
fn client_id_prefix(client_id: &str) -> String {
    let prefix: String = client_id.chars().take(5).collect();
    format!("{}...", prefix)
}

/// Reports the OAuth settings the service is running with.
pub async fn test_config(State(state): State<AppState>) -> Json<TestConfigResponse> {
    let config = &state.config;

    Json(TestConfigResponse {
        success: true,
        config: ConfigSummary {
            provider: PROVIDER,
            client_id: client_id_prefix(&config.client_id),
            oauth_version: "2.0",
            configured_url: config.app_url.clone(),
            callback_url: config.callback_url(),
            requested_scopes: config.scopes.clone(),
            is_configured: config.is_oauth_configured(),
        },
        recommendations: [
            "Verify the provider developer portal settings match this configuration",
            "Ensure the callback URL is registered exactly as shown",
            "Check that the app has OAuth 2.0 enabled with all requested scopes",
        ],
    })
}
