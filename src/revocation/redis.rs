use crate::revocation::{RevocationRecord, RevocationStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared revocation store for multi-instance deployments.
///
/// Records live under `revoked:{jti}` with a TTL equal to the remaining
/// token lifetime, so Redis performs the expiry sweep itself.
pub struct RedisRevocationStore {
    conn: Arc<RwLock<ConnectionManager>>,
}

impl RedisRevocationStore {
    /// Connects to the given Redis instance.
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Backend(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(RwLock::new(conn)),
        })
    }

    fn key(jti: &str) -> String {
        format!("revoked:{}", jti)
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn add(&self, record: RevocationRecord) -> Result<(), StoreError> {
        // SET on an existing key overwrites an identical record, which
        // is the idempotent case.
        let ttl = (record.expires_at - Utc::now()).num_seconds().max(1) as u64;
        let value =
            serde_json::to_string(&record).map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut conn = self.conn.write().await;
        conn.set_ex::<_, _, ()>(Self::key(&record.jti), value, ttl)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn contains(&self, jti: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.write().await;
        conn.exists(Self::key(jti))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        // Keys carry a TTL; Redis expires them without our help.
        Ok(0)
    }
}
