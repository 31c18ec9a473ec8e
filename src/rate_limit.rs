//! Per-key sliding-window request admission.
//!
//! Counters live behind a store abstraction so single-instance
//! deployments use the in-process map while multi-instance deployments
//! can substitute a shared backend. Storage failure is fail-open: rate
//! limiting protects availability, so an unavailable limiter must not
//! take the service down with it. (Revocation checks are the opposite —
//! they fail closed.)

use crate::audit::{SecurityEvent, SecurityEventCategory, SecurityEventSink, Severity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

/// Backend failure inside a rate-limit store.
#[derive(Error, Debug)]
pub enum RateStoreError {
    /// The backing store could not be reached or rejected the operation
    #[error("rate limit store backend error: {0}")]
    Backend(String),
}

/// Post-increment counter state for one key's current window.
#[derive(Debug, Clone, Copy)]
pub struct WindowSnapshot {
    /// Requests observed in the window, including this one
    pub count: u32,
    /// When the window resets
    pub reset_at: DateTime<Utc>,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Requests left in the window after this one
    pub remaining: u32,
    /// When the window resets
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Duration until the window resets, for Retry-After headers.
    pub fn retry_after(&self) -> Duration {
        (self.reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(1))
    }
}

/// Endpoint classes with distinct limits. Authentication-class
/// endpoints get the stricter one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    /// General API endpoints
    General,
    /// Sign-in, refresh, and other authentication endpoints
    Auth,
}

impl EndpointClass {
    /// Stable name used in rate keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
        }
    }
}

/// Limit and window for one endpoint class.
#[derive(Debug, Clone, Copy)]
pub struct LimitSpec {
    /// Maximum requests per window
    pub limit: u32,
    /// Window duration
    pub window: Duration,
}

/// Limits per endpoint class.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    /// General endpoints
    pub general: LimitSpec,
    /// Authentication-class endpoints
    pub auth: LimitSpec,
}

impl RateLimits {
    /// Builds limits from configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            general: LimitSpec {
                limit: config.general_limit,
                window: config.general_window,
            },
            auth: LimitSpec {
                limit: config.auth_limit,
                window: config.auth_window,
            },
        }
    }

    fn spec(&self, class: EndpointClass) -> LimitSpec {
        match class {
            EndpointClass::General => self.general,
            EndpointClass::Auth => self.auth,
        }
    }
}

/// Counter storage. `hit` must be atomic per key so two concurrent
/// requests never both observe `count = limit - 1`.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increments the counter for `key`, replacing the window first if
    /// it has elapsed, and returns the post-increment state.
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowSnapshot, RateStoreError>;
}

/// In-process counter store for single-instance deployments.
pub struct InMemoryRateLimitStore {
    windows: RwLock<HashMap<String, WindowSnapshot>>,
}

impl InMemoryRateLimitStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Drops entries whose window has elapsed, returning how many were
    /// removed. Keys for one-off clients otherwise linger forever;
    /// deployments run this on the same cadence as the revocation
    /// sweeper.
    pub async fn sweep_elapsed(&self) -> u64 {
        let now = Utc::now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| w.reset_at >= now);
        (before - windows.len()) as u64
    }
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowSnapshot, RateStoreError> {
        let now = Utc::now();
        let mut windows = self.windows.write().await;

        let snapshot = windows
            .entry(key.to_string())
            .and_modify(|w| {
                if now > w.reset_at {
                    // Elapsed windows are replaced, not incremented.
                    w.count = 1;
                    w.reset_at = now + window;
                } else {
                    w.count += 1;
                }
            })
            .or_insert_with(|| WindowSnapshot {
                count: 1,
                reset_at: now + window,
            });

        Ok(*snapshot)
    }
}

/// The admission gate used by the request pipeline.
pub struct SlidingWindowLimiter {
    store: Arc<dyn RateLimitStore>,
    limits: RateLimits,
    sink: Arc<dyn SecurityEventSink>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter over the given store.
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        limits: RateLimits,
        sink: Arc<dyn SecurityEventSink>,
    ) -> Self {
        Self {
            store,
            limits,
            sink,
        }
    }

    /// Admission check using the configured limits for `class`.
    pub async fn admit(&self, key: &str, class: EndpointClass) -> RateLimitDecision {
        let spec = self.limits.spec(class);
        self.admit_with(key, spec.limit, spec.window).await
    }

    /// Admission check with explicit limit and window.
    ///
    /// The counter is incremented first and `allowed` evaluated after,
    /// so the request that crosses the threshold is the first one
    /// denied.
    pub async fn admit_with(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> RateLimitDecision {
        match self.store.hit(key, window).await {
            Ok(snapshot) => RateLimitDecision {
                allowed: snapshot.count <= limit,
                remaining: limit.saturating_sub(snapshot.count),
                reset_at: snapshot.reset_at,
            },
            Err(e) => {
                warn!(key = %key, error = %e, "Rate limit store unavailable, admitting request");
                self.sink
                    .record(
                        SecurityEvent::new(
                            SecurityEventCategory::StoreFailure,
                            Severity::Critical,
                        )
                        .with_detail("store", "rate_limit")
                        .with_detail("error", e.to_string()),
                    )
                    .await;

                RateLimitDecision {
                    allowed: true,
                    remaining: limit.saturating_sub(1),
                    reset_at: Utc::now() + window,
                }
            }
        }
    }
}
