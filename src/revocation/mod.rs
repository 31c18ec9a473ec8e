//! Durable record of invalidated token identifiers.
//!
//! The store is keyed by `jti` and has no independent authorization
//! meaning; nothing queries revocation status except
//! [`TokenService::verify`](crate::token::TokenService::verify).

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub use memory::InMemoryRevocationStore;
pub use redis::RedisRevocationStore;

/// Backend failure inside a revocation store.
///
/// Callers decide the failure mode: `verify` fails closed, the sweeper
/// merely logs and retries on the next tick.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the operation
    #[error("revocation store backend error: {0}")]
    Backend(String),
}

/// One invalidated token identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevocationRecord {
    /// `jti` of the invalidated token
    pub jti: String,
    /// Owning subject, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Original token expiry; cleanup never needs to outlive the token
    pub expires_at: DateTime<Utc>,
    /// When the revocation was written
    pub revoked_at: DateTime<Utc>,
    /// Human-readable reason ("logout", "refresh", admin action)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RevocationRecord {
    /// Creates a record revoked at `now`.
    pub fn new(
        jti: impl Into<String>,
        subject: Option<String>,
        expires_at: DateTime<Utc>,
        reason: Option<String>,
    ) -> Self {
        Self {
            jti: jti.into(),
            subject,
            expires_at,
            revoked_at: Utc::now(),
            reason,
        }
    }
}

/// Key-value durable set keyed by `jti`.
///
/// `add` and `contains` must be atomic per key: a concurrent verify
/// either sees the revocation or does not, never a partial write.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Writes a record. Idempotent: a duplicate `jti` is "already
    /// revoked", not an error.
    async fn add(&self, record: RevocationRecord) -> Result<(), StoreError>;

    /// Whether the given `jti` has been revoked.
    async fn contains(&self, jti: &str) -> Result<bool, StoreError>;

    /// Deletes records past their expiry, returning how many were
    /// removed. Advisory: a post-expiry lookup already denies the token
    /// via the expiry check.
    async fn sweep_expired(&self) -> Result<u64, StoreError>;
}

/// Spawns the periodic revocation sweep.
///
/// Sweep failures are logged and retried on the next tick; correctness
/// never depends on the sweep.
pub fn spawn_sweeper(
    store: Arc<dyn RevocationStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.sweep_expired().await {
                Ok(removed) if removed > 0 => {
                    info!(removed = %removed, "Swept expired revocation records");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Revocation sweep failed");
                }
            }
        }
    })
}
