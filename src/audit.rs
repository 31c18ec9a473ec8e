//! Security-event audit pipeline.
//!
//! Every authentication success/failure, authorization denial,
//! rate-limit rejection, and unhandled error flows through a
//! [`SecurityEventSink`]. Recording is best-effort: events are always
//! logged, persistence failures are caught and logged themselves, and
//! nothing ever propagates back to the request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// What kind of security event occurred.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventCategory {
    /// A token verified successfully
    AuthenticationSuccess,
    /// A token was missing, invalid, expired, or revoked
    AuthenticationFailure,
    /// Verified claims did not satisfy a required permission
    AuthorizationDenied,
    /// A request was rejected by the rate limiter
    RateLimitExceeded,
    /// A request was rejected before authentication (shape, IP, CSRF)
    ValidationRejected,
    /// A backing store failed while serving a request
    StoreFailure,
    /// An unexpected error surfaced while processing a request
    UnhandledError,
}

impl SecurityEventCategory {
    /// Stable name used in logs and persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess => "authentication_success",
            Self::AuthenticationFailure => "authentication_failure",
            Self::AuthorizationDenied => "authorization_denied",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ValidationRejected => "validation_rejected",
            Self::StoreFailure => "store_failure",
            Self::UnhandledError => "unhandled_error",
        }
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected outcome worth an audit trail entry
    Info,
    /// Denied or rejected request
    Warning,
    /// Infrastructure failure or unexpected error
    Critical,
}

/// One append-only audit record. Never mutated or deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Event category
    pub category: SecurityEventCategory,
    /// Severity
    pub severity: Severity,
    /// Subject id, when a verified or partially-verified identity exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Subject email, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Client address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// Client user agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Structured detail map
    pub detail: Map<String, Value>,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// Creates an event stamped at `now`.
    pub fn new(category: SecurityEventCategory, severity: Severity) -> Self {
        Self {
            category,
            severity,
            subject: None,
            email: None,
            client_ip: None,
            user_agent: None,
            detail: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Sets the subject id.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the subject email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the client address.
    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Sets the client user agent.
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Adds a detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}

/// Destination for security events.
#[async_trait]
pub trait SecurityEventSink: Send + Sync {
    /// Records an event. Infallible by contract; implementations recover
    /// from their own failures.
    async fn record(&self, event: SecurityEvent);
}

/// Sink that emits structured tracing events only.
pub struct TracingSink;

impl TracingSink {
    fn log(event: &SecurityEvent) {
        let detail = Value::Object(event.detail.clone()).to_string();
        match event.severity {
            Severity::Info => info!(
                category = event.category.as_str(),
                subject = event.subject.as_deref().unwrap_or("-"),
                client_ip = event.client_ip.as_deref().unwrap_or("-"),
                detail = %detail,
                "Security event"
            ),
            Severity::Warning => warn!(
                category = event.category.as_str(),
                subject = event.subject.as_deref().unwrap_or("-"),
                client_ip = event.client_ip.as_deref().unwrap_or("-"),
                detail = %detail,
                "Security event"
            ),
            Severity::Critical => error!(
                category = event.category.as_str(),
                subject = event.subject.as_deref().unwrap_or("-"),
                client_ip = event.client_ip.as_deref().unwrap_or("-"),
                detail = %detail,
                "Security event"
            ),
        }
    }
}

#[async_trait]
impl SecurityEventSink for TracingSink {
    async fn record(&self, event: SecurityEvent) {
        Self::log(&event);
    }
}

/// Durable backend behind [`PersistentSink`].
#[async_trait]
pub trait EventWriter: Send + Sync {
    /// Appends one event.
    async fn write(&self, event: &SecurityEvent) -> Result<(), anyhow::Error>;
}

/// Sink that logs every event and independently attempts durable
/// persistence. A persistence failure is itself logged, never surfaced.
pub struct PersistentSink {
    writer: Arc<dyn EventWriter>,
}

impl PersistentSink {
    /// Wraps a writer.
    pub fn new(writer: Arc<dyn EventWriter>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl SecurityEventSink for PersistentSink {
    async fn record(&self, event: SecurityEvent) {
        TracingSink::log(&event);

        if let Err(e) = self.writer.write(&event).await {
            warn!(
                category = event.category.as_str(),
                error = %e,
                "Security event persistence failed"
            );
        }
    }
}

/// Writer that buffers events in memory. Used by tests and by
/// single-instance deployments that export the buffer elsewhere.
#[derive(Default)]
pub struct MemoryEventWriter {
    events: tokio::sync::Mutex<Vec<SecurityEvent>>,
}

impl MemoryEventWriter {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub async fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventWriter for MemoryEventWriter {
    async fn write(&self, event: &SecurityEvent) -> Result<(), anyhow::Error> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
