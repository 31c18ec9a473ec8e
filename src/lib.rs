//! Session & Authorization Engine.
//!
//! Provides session token issuance/verification/refresh/revocation,
//! context-scoped RBAC decisions, sliding-window rate limiting, and the
//! security-event audit pipeline that observes all of the above.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod authz;
pub mod config;
pub mod error;
pub mod jwt;
pub mod pipeline;
pub mod rate_limit;
pub mod revocation;
pub mod telemetry;
pub mod token;

// Re-exports for convenience
pub use authz::{Operation, Permission};
pub use config::Config;
pub use error::{AuthError, ErrorCode, ErrorResponse};
pub use jwt::claims::SessionClaims;
pub use token::TokenService;
