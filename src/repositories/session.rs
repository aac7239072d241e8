use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::aes::{self, KEY_SIZE};
use crate::error::{AppError, Result};
use crate::models::session::{PendingAuthorization, Session};

/// Lifetime of a pending OAuth authorization, in seconds.
pub const PENDING_AUTH_TTL_SECS: u64 = 600;

/// Key-value persistence for opaque session blobs.
///
/// `set` replaces the whole value atomically; `take` reads and removes it in
/// one step, so at most one caller ever receives a given value.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// A `SessionStore` backed by Redis keys with expiry.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis: ConnectionManager,
}

impl RedisSessionStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut redis = self.redis.clone();
        let value: Option<Vec<u8>> = redis.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis.set_ex(key, value, ttl_secs.max(1)).await.map_err(|e| {
            tracing::error!("❌ Redis set_ex failed: {}", e);
            AppError::Redis(e)
        })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis.del(key).await?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut redis = self.redis.clone();
        let value: Option<Vec<u8>> = redis.get_del(key).await?;
        Ok(value)
    }
}

/// Typed, sealed access to session records and pending authorizations.
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn SessionStore>,
    key: Arc<Zeroizing<[u8; KEY_SIZE]>>,
}

fn session_key(id: Uuid) -> String {
    format!("session:{}", id)
}

fn pending_key(state: &str) -> String {
    format!("oauth_state:{}", state)
}

impl SessionRepository {
    /// Creates a repository sealing records with `master_key`.
    pub fn new(store: Arc<dyn SessionStore>, master_key: &[u8]) -> Result<Self> {
        let key = aes::key_from_slice(master_key)?;
        Ok(Self {
            store,
            key: Arc::new(Zeroizing::new(key)),
        })
    }

    fn seal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = Zeroizing::new(
            sonic_rs::to_vec(value)
                .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?,
        );
        aes::seal(&self.key, &json)
    }

    fn open<T: DeserializeOwned>(&self, sealed: &[u8]) -> Result<T> {
        let json = Zeroizing::new(aes::open(&self.key, sealed)?);
        sonic_rs::from_slice(&json)
            .map_err(|e| AppError::Internal(format!("Session deserialization failed: {}", e)))
    }

    pub async fn load_session(&self, id: Uuid) -> Result<Option<Session>> {
        match self.store.get(&session_key(id)).await? {
            Some(sealed) => Ok(Some(self.open(&sealed)?)),
            None => Ok(None),
        }
    }

    /// Stores `session` until its own `expires_at`.
    pub async fn save_session(&self, id: Uuid, session: &Session) -> Result<()> {
        let ttl = (session.expires_at - chrono::Utc::now()).num_seconds().max(1) as u64;
        let sealed = self.seal(session)?;
        self.store.set(&session_key(id), sealed, ttl).await?;
        tracing::debug!("✅ Session saved: session:{}", id);
        Ok(())
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        self.store.delete(&session_key(id)).await
    }

    pub async fn save_pending(&self, state: &str, pending: &PendingAuthorization) -> Result<()> {
        let sealed = self.seal(pending)?;
        self.store
            .set(&pending_key(state), sealed, PENDING_AUTH_TTL_SECS)
            .await
    }

    /// Fetches and deletes the pending authorization for `state`.
    pub async fn take_pending(&self, state: &str) -> Result<Option<PendingAuthorization>> {
        let Some(sealed) = self.store.take(&pending_key(state)).await? else {
            return Ok(None);
        };

        let pending: PendingAuthorization = self.open(&sealed)?;
        let age = chrono::Utc::now() - pending.created_at;
        if age.num_seconds() > PENDING_AUTH_TTL_SECS as i64 {
            return Ok(None);
        }
        Ok(Some(pending))
    }
}
