//! Error handling module with type-safe, non-exhaustive error types
//!
//! Every failure kind the engine can surface to the HTTP boundary lives
//! here, each mapped to a fixed status code and a stable machine-readable
//! error code string. Messages are sanitized before they reach a response
//! body; raw tokens are truncated before they reach a log line.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Sensitive patterns that should be sanitized from error messages
const SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "secret",
    "token",
    "key",
    "credential",
    "bearer",
    "authorization",
    "signature",
];

/// Maximum number of raw token characters allowed in diagnostics.
const TOKEN_EXCERPT_LEN: usize = 20;

/// Non-exhaustive error enum for forward compatibility.
///
/// Every variant is terminal for the request that produced it: it
/// short-circuits the guard pipeline and is surfaced to the client.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AuthError {
    /// Token is malformed or its signature does not verify
    #[error("Token invalid")]
    InvalidToken,

    /// Token has expired
    #[error("Token expired at {expired_at}")]
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },

    /// Token identifier is present in the revocation store, or the store
    /// could not be reached (revocation checks fail closed)
    #[error("Token revoked")]
    TokenRevoked,

    /// No token supplied on a route that requires authentication
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Verified claims do not satisfy the required permission
    #[error("Insufficient permissions for {operation} in context {context:?}")]
    InsufficientPermissions {
        /// Operation that was attempted
        operation: String,
        /// Target context, absent for global-scope operations
        context: Option<String>,
    },

    /// Tenant-scoped route reached with no resolvable partner context
    #[error("Partner context required")]
    PartnerContextRequired,

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited {
        /// When the client can retry
        retry_after: Duration,
    },

    /// Malformed request parameters
    #[error("Validation failed: {reason}")]
    ValidationFailed {
        /// Description of the rejected shape
        reason: String,
    },

    /// Client address is on the blocked list
    #[error("Client address blocked")]
    IpBlocked,

    /// Origin check failed on a state-changing request
    #[error("Cross-origin request rejected")]
    CsrfRejected,

    /// Internal error (details sanitized in responses)
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Stable error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// AUTH_TOKEN_INVALID
    TokenInvalid,
    /// AUTH_TOKEN_EXPIRED
    TokenExpired,
    /// AUTH_TOKEN_REVOKED
    TokenRevoked,
    /// AUTH_REQUIRED
    AuthenticationRequired,
    /// AUTH_INSUFFICIENT_PERMISSIONS
    InsufficientPermissions,
    /// AUTH_PARTNER_CONTEXT_REQUIRED
    PartnerContextRequired,
    /// RATE_LIMITED
    RateLimited,
    /// VALIDATION_FAILED
    ValidationFailed,
    /// AUTH_IP_BLOCKED
    IpBlocked,
    /// AUTH_CSRF_REJECTED
    CsrfRejected,
    /// INTERNAL_ERROR
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenInvalid => "AUTH_TOKEN_INVALID",
            Self::TokenExpired => "AUTH_TOKEN_EXPIRED",
            Self::TokenRevoked => "AUTH_TOKEN_REVOKED",
            Self::AuthenticationRequired => "AUTH_REQUIRED",
            Self::InsufficientPermissions => "AUTH_INSUFFICIENT_PERMISSIONS",
            Self::PartnerContextRequired => "AUTH_PARTNER_CONTEXT_REQUIRED",
            Self::RateLimited => "RATE_LIMITED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::IpBlocked => "AUTH_IP_BLOCKED",
            Self::CsrfRejected => "AUTH_CSRF_REJECTED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Self::TokenInvalid
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::AuthenticationRequired => 401,
            Self::InsufficientPermissions
            | Self::PartnerContextRequired
            | Self::IpBlocked
            | Self::CsrfRejected => 403,
            Self::RateLimited => 429,
            Self::ValidationFailed => 400,
            Self::Internal => 500,
        }
    }
}

/// Structured error response with correlation ID
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable message (sanitized)
    pub message: String,
    /// Correlation ID for tracing
    pub correlation_id: Uuid,
    /// Optional retry-after duration
    pub retry_after: Option<Duration>,
}

impl ErrorResponse {
    /// Create a new error response from an [`AuthError`]
    pub fn from_error(error: &AuthError, correlation_id: Uuid) -> Self {
        let (code, message, retry_after) = match error {
            AuthError::InvalidToken => {
                (ErrorCode::TokenInvalid, "Token is invalid".to_string(), None)
            }
            AuthError::TokenExpired { .. } => {
                (ErrorCode::TokenExpired, "Token has expired".to_string(), None)
            }
            AuthError::TokenRevoked => {
                (ErrorCode::TokenRevoked, "Token has been revoked".to_string(), None)
            }
            AuthError::AuthenticationRequired => (
                ErrorCode::AuthenticationRequired,
                "Authentication is required".to_string(),
                None,
            ),
            AuthError::InsufficientPermissions { .. } => (
                ErrorCode::InsufficientPermissions,
                "Insufficient permissions".to_string(),
                None,
            ),
            AuthError::PartnerContextRequired => (
                ErrorCode::PartnerContextRequired,
                "A partner context is required for this operation".to_string(),
                None,
            ),
            AuthError::RateLimited { retry_after } => (
                ErrorCode::RateLimited,
                "Rate limit exceeded".to_string(),
                Some(*retry_after),
            ),
            AuthError::ValidationFailed { reason } => {
                (ErrorCode::ValidationFailed, sanitize_message(reason), None)
            }
            AuthError::IpBlocked => {
                (ErrorCode::IpBlocked, "Access denied".to_string(), None)
            }
            AuthError::CsrfRejected => {
                (ErrorCode::CsrfRejected, "Cross-origin request rejected".to_string(), None)
            }
            AuthError::Internal(_) => {
                // Never expose internal error details
                (ErrorCode::Internal, "Internal error".to_string(), None)
            }
        };

        ErrorResponse {
            code,
            message,
            correlation_id,
            retry_after,
        }
    }

    /// HTTP status code for this response
    pub fn status(&self) -> u16 {
        self.code.http_status()
    }

    /// JSON body for the HTTP boundary
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.code.as_str(),
            "message": self.message,
            "correlation_id": self.correlation_id.to_string(),
        });
        if let Some(retry_after) = self.retry_after {
            body["retry_after_secs"] = serde_json::json!(retry_after.as_secs());
        }
        body
    }
}

impl AuthError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidToken => ErrorCode::TokenInvalid,
            Self::TokenExpired { .. } => ErrorCode::TokenExpired,
            Self::TokenRevoked => ErrorCode::TokenRevoked,
            Self::AuthenticationRequired => ErrorCode::AuthenticationRequired,
            Self::InsufficientPermissions { .. } => ErrorCode::InsufficientPermissions,
            Self::PartnerContextRequired => ErrorCode::PartnerContextRequired,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            Self::IpBlocked => ErrorCode::IpBlocked,
            Self::CsrfRejected => ErrorCode::CsrfRejected,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Get retry-after duration if applicable
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Convert to a client-facing response with a fresh correlation ID
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::from_error(self, Uuid::new_v4())
    }
}

/// Sanitize a message by removing sensitive information
pub fn sanitize_message(message: &str) -> String {
    let lower = message.to_lowercase();
    for pattern in SENSITIVE_PATTERNS {
        if lower.contains(pattern) {
            return "Request rejected".to_string();
        }
    }
    message.to_string()
}

/// Truncate a raw token for diagnostic logging.
///
/// Response bodies and log lines never carry more than 20 characters of
/// token material.
pub fn token_excerpt(token: &str) -> String {
    // Truncate on a char boundary; the token is attacker-supplied and
    // may put a multi-byte sequence across the cut.
    match token.char_indices().nth(TOKEN_EXCERPT_LEN) {
        Some((i, _)) => format!("{}...", &token[..i]),
        None => token.to_string(),
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired {
                expired_at: Utc::now(),
            },
            // Everything else the decoder reports is a malformed or
            // forged token; no distinction is exposed to the client.
            _ => AuthError::InvalidToken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::InvalidToken.code().http_status(), 401);
        assert_eq!(AuthError::TokenRevoked.code().http_status(), 401);
        assert_eq!(AuthError::PartnerContextRequired.code().http_status(), 403);
        assert_eq!(
            AuthError::RateLimited {
                retry_after: Duration::from_secs(30)
            }
            .code()
            .http_status(),
            429
        );
        assert_eq!(
            AuthError::ValidationFailed {
                reason: "bad".into()
            }
            .code()
            .http_status(),
            400
        );
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ErrorCode::TokenRevoked.as_str(), "AUTH_TOKEN_REVOKED");
        assert_eq!(ErrorCode::RateLimited.as_str(), "RATE_LIMITED");
        assert_eq!(
            ErrorCode::InsufficientPermissions.as_str(),
            "AUTH_INSUFFICIENT_PERMISSIONS"
        );
    }

    #[test]
    fn test_rate_limited_body_carries_retry_after() {
        let err = AuthError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        let body = err.to_response().to_body();
        assert_eq!(body["retry_after_secs"], 42);
        assert_eq!(body["error"], "RATE_LIMITED");
    }

    #[test]
    fn test_sanitize_strips_sensitive_messages() {
        assert_eq!(sanitize_message("bad signature bytes"), "Request rejected");
        assert_eq!(sanitize_message("field too long"), "field too long");
    }

    #[test]
    fn test_token_excerpt_capped_at_20_chars() {
        let token = "a".repeat(200);
        let excerpt = token_excerpt(&token);
        assert_eq!(excerpt, format!("{}...", "a".repeat(20)));
        assert_eq!(token_excerpt("short"), "short");
    }

    #[test]
    fn test_token_excerpt_cuts_on_char_boundary() {
        // 21 bytes, 7 chars: the byte-20 cut falls inside the last char.
        let token = "€".repeat(7);
        assert_eq!(token_excerpt(&token), token);

        let long = "€".repeat(30);
        let excerpt = token_excerpt(&long);
        assert_eq!(excerpt, format!("{}...", "€".repeat(20)));
        assert_eq!(
            excerpt.chars().filter(|c| *c == '€').count(),
            TOKEN_EXCERPT_LEN
        );
    }

    #[test]
    fn test_internal_error_is_opaque() {
        let err = AuthError::Internal(anyhow::anyhow!("db password leaked"));
        let resp = err.to_response();
        assert_eq!(resp.message, "Internal error");
        assert_eq!(resp.status(), 500);
    }

    #[test]
    fn test_jwt_error_conversion() {
        let err = jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::InvalidSignature,
        );
        assert!(matches!(AuthError::from(err), AuthError::InvalidToken));
    }
}
