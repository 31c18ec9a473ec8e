use crate::revocation::{RevocationRecord, RevocationStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process revocation store for single-instance deployments.
///
/// Constructed once at process start and passed by reference to every
/// request handler; all mutation happens under the write lock, so
/// `add`/`contains` are atomic per key.
pub struct InMemoryRevocationStore {
    records: RwLock<HashMap<String, RevocationRecord>>,
}

impl InMemoryRevocationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live records, for diagnostics.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryRevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn add(&self, record: RevocationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        // First write wins; a duplicate jti means "already revoked".
        records.entry(record.jti.clone()).or_insert(record);
        Ok(())
    }

    async fn contains(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(self.records.read().await.contains_key(jti))
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.expires_at > now);
        Ok((before - records.len()) as u64)
    }
}
