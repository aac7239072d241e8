use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

/// The only OAuth provider this service talks to.
pub const PROVIDER: &str = "twitter";

const DEFAULT_SCOPES: &str = "tweet.read users.read offline.access";
const DEFAULT_AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
const DEFAULT_TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
const DEFAULT_PROVIDER_API_URL: &str = "https://api.twitter.com/2";

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// Public base URL of this service (used to build the OAuth callback).
    pub app_url: String,
    /// OAuth client id. Empty when not configured.
    pub client_id: String,
    /// OAuth client secret. Empty when not configured.
    pub client_secret: Zeroizing<String>,
    /// Space-separated OAuth scopes.
    pub scopes: String,
    /// Provider authorization endpoint.
    pub authorize_url: String,
    /// Provider token endpoint (code exchange and refresh).
    pub token_url: String,
    /// Provider API base; profile lookup and update live at `/users/me`.
    pub provider_api_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The duration of a session in days.
    pub session_duration_days: i64,
    /// The master key used to seal session records and sign cookies.
    pub master_key: Zeroizing<Vec<u8>>,
    /// Timeout applied to every outbound HTTP call, in seconds.
    pub http_timeout_secs: u64,
    /// Largest source image the dispatcher will download.
    pub max_image_bytes: usize,
    /// Largest width or height a source image may decode to.
    pub max_image_dimension: u32,
    /// Allocation ceiling for a single decode.
    pub max_decode_bytes: u64,
    /// Upper bound on concurrent decode/composite/encode jobs.
    pub max_concurrent_composites: usize,
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Whether cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut master_key_hex = env::var("MASTER_KEY")
            .context("MASTER_KEY must be set (generate with: openssl rand -hex 32)")?;

        let master_key_bytes = hex::decode(&master_key_hex)
            .context("MASTER_KEY must be valid hexadecimal")?;

        master_key_hex.zeroize();

        if master_key_bytes.len() != 32 {
            anyhow::bail!("MASTER_KEY must be exactly 32 bytes (64 hex characters)");
        }

        let app_url = env::var("APP_URL")
            .context("APP_URL must be set (e.g. http://localhost:3000)")?
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&app_url).context("APP_URL must be an absolute URL")?;

        Ok(Self {
            app_url,
            client_id: env::var("TWITTER_CLIENT_ID").unwrap_or_default(),
            client_secret: Zeroizing::new(env::var("TWITTER_CLIENT_SECRET").unwrap_or_default()),
            scopes: env::var("OAUTH_SCOPES").unwrap_or_else(|_| DEFAULT_SCOPES.to_string()),
            authorize_url: env::var("OAUTH_AUTHORIZE_URL")
                .unwrap_or_else(|_| DEFAULT_AUTHORIZE_URL.to_string()),
            token_url: env::var("OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
            provider_api_url: env::var("PROVIDER_API_URL")
                .unwrap_or_else(|_| DEFAULT_PROVIDER_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            session_duration_days: env::var("SESSION_DURATION_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid SESSION_DURATION_DAYS")?,
            master_key: Zeroizing::new(master_key_bytes),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("Invalid HTTP_TIMEOUT_SECS")?,
            max_image_bytes: env::var("MAX_IMAGE_BYTES")
                .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
                .parse()
                .context("Invalid MAX_IMAGE_BYTES")?,
            max_image_dimension: env::var("MAX_IMAGE_DIMENSION")
                .unwrap_or_else(|_| "4096".to_string())
                .parse()
                .context("Invalid MAX_IMAGE_DIMENSION")?,
            max_decode_bytes: env::var("MAX_DECODE_BYTES")
                .unwrap_or_else(|_| (128 * 1024 * 1024).to_string())
                .parse()
                .context("Invalid MAX_DECODE_BYTES")?,
            max_concurrent_composites: env::var("MAX_CONCURRENT_COMPOSITES")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .context("Invalid MAX_CONCURRENT_COMPOSITES")?,
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            secure_cookies: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string()) == "production",
        })
    }

    /// Whether both OAuth client credentials are present.
    pub fn is_oauth_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// The redirect URI registered with the provider.
    pub fn callback_url(&self) -> String {
        format!("{}/api/auth/callback/{}", self.app_url, PROVIDER)
    }

    /// Endpoint for both profile lookup and profile image update.
    pub fn profile_url(&self) -> String {
        format!("{}/users/me", self.provider_api_url)
    }
}

#[cfg(test)]
impl Config {
    /// A configuration whose provider endpoints all point at `provider_base`.
    pub fn for_tests(provider_base: &str) -> Self {
        Self {
            app_url: "http://localhost:3000".to_string(),
            client_id: "test-client-id".to_string(),
            client_secret: Zeroizing::new("test-client-secret".to_string()),
            scopes: DEFAULT_SCOPES.to_string(),
            authorize_url: format!("{}/i/oauth2/authorize", provider_base),
            token_url: format!("{}/2/oauth2/token", provider_base),
            provider_api_url: format!("{}/2", provider_base),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            session_duration_days: 30,
            master_key: Zeroizing::new(vec![7u8; 32]),
            http_timeout_secs: 5,
            max_image_bytes: 1024 * 1024,
            max_image_dimension: 2048,
            max_decode_bytes: 64 * 1024 * 1024,
            max_concurrent_composites: 2,
            bind_addr: "127.0.0.1:0".parse().expect("valid socket address"),
            secure_cookies: false,
        }
    }
}
