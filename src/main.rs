use http::{HeaderValue, Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::cors::CorsLayer;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod compositor;
mod config;
mod error;
mod routes;
mod state;
mod crypto {
    pub mod aes;
    pub mod csrf;
    pub mod pkce;
}

mod models {
    pub mod session;
    pub mod token;
    pub mod user;
}

mod repositories {
    pub mod session;
}

mod services {
    pub mod banner;
    pub mod token;
}

mod handlers {
    pub mod auth;
    pub mod banner;
    pub mod config;
}

mod middleware_layer {
    pub mod auth;
    pub mod csrf;
}

mod validation {
    pub mod banner;
}

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    if !config.is_oauth_configured() {
        tracing::warn!(
            "⚠️ TWITTER_CLIENT_ID / TWITTER_CLIENT_SECRET not set; sign-in is disabled"
        );
    }

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    let allowed_origin = HeaderValue::from_str(&config.app_url)
        .map_err(|e| anyhow::anyhow!("APP_URL is not a valid origin: {}", e))?;

    let cors = CorsLayer::new()
        .allow_origin([allowed_origin])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
            header::HeaderName::from_static(middleware_layer::csrf::CSRF_HEADER),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(20)
            .use_headers()
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let app = routes::build_router(state)
        .layer(tower_governor::GovernorLayer::new(governor_conf))
        .layer(cors);

    let addr: SocketAddr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ All systems operational");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
