use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use sha2::{Digest, Sha512};
use tokio::sync::{Semaphore, SemaphorePermit};
use tower_cookies::Key;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::repositories::session::{RedisSessionStore, SessionRepository, SessionStore};
use crate::services::token::TokenManager;

/// Bounds concurrent decode/composite/encode jobs on the blocking pool.
#[derive(Clone)]
pub struct CompositeLimiter {
    semaphore: Arc<Semaphore>,
}

impl CompositeLimiter {
    /// Creates a new `CompositeLimiter`.
    pub fn new(max_jobs: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_jobs.max(1))),
        }
    }

    /// Acquires a permit from the semaphore.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.semaphore
            .acquire()
            .await
            .map_err(|e| AppError::Internal(format!("Composite limiter closed: {}", e)))
    }

    /// Returns the number of available permits.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// Sealed session records in the session store.
    pub sessions: SessionRepository,
    /// Shared outbound HTTP client with the configured timeout.
    pub http: reqwest::Client,
    /// Token lifecycle manager.
    pub tokens: TokenManager,
    /// Key signing the `session_id` cookie.
    pub cookie_key: Key,
    /// The composite job limiter.
    pub composite_limiter: CompositeLimiter,
}

/// Derives the cookie-signing key from the master key.
fn derive_cookie_key(master_key: &[u8]) -> Result<Key> {
    let mut hasher = Sha512::new();
    hasher.update(b"ringpfp-cookie-signing");
    hasher.update(master_key);
    let digest = hasher.finalize();

    Key::try_from(digest.as_slice())
        .map_err(|e| AppError::Encryption(format!("Cookie key derivation failed: {}", e)))
}

impl AppState {
    /// Creates a new `AppState` connected to Redis.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    pub async fn new(config: &Config) -> Result<Self> {
        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        Self::with_store(config, Arc::new(RedisSessionStore::new(redis)))
    }

    /// Creates a new `AppState` on top of any session store.
    pub fn with_store(config: &Config, store: Arc<dyn SessionStore>) -> Result<Self> {
        let config = Arc::new(config.clone());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("ringpfp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        tracing::info!("✅ HTTP client initialized ({}s timeout)", config.http_timeout_secs);

        let sessions = SessionRepository::new(store, &config.master_key)?;
        let cookie_key = derive_cookie_key(&config.master_key)?;
        let tokens = TokenManager::new(http.clone(), config.clone());

        let composite_limiter = CompositeLimiter::new(config.max_concurrent_composites);
        tracing::info!(
            "✅ Composite limiter initialized (max {} concurrent jobs)",
            composite_limiter.available_permits()
        );

        Ok(AppState {
            config,
            sessions,
            http,
            tokens,
            cookie_key,
            composite_limiter,
        })
    }
}

#[cfg(test)]
impl AppState {
    /// State wired to an in-memory store and provider endpoints at `provider_base`.
    pub fn for_tests(provider_base: &str) -> Self {
        use crate::repositories::session::memory::MemorySessionStore;

        let config = Config::for_tests(provider_base);
        Self::with_store(&config, Arc::new(MemorySessionStore::default()))
            .expect("test state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limiter_releases_permits() {
        let limiter = CompositeLimiter::new(2);
        {
            let _permit = limiter.acquire().await.unwrap();
            assert_eq!(limiter.available_permits(), 1);
        }
        assert_eq!(limiter.available_permits(), 2);
    }

    #[test]
    fn cookie_key_is_deterministic() {
        let a = derive_cookie_key(&[5u8; 32]).unwrap();
        let b = derive_cookie_key(&[5u8; 32]).unwrap();
        assert_eq!(a.master(), b.master());
    }
}
