//! Session claims and their JWT wire representation.

pub mod builder;
pub mod claims;
pub mod serializer;

pub use builder::{ClaimsBuilder, ExternalIdentity, SessionDescriptor};
pub use claims::{RateLimitTier, Role, RoleAssignment, SessionClaims};
pub use serializer::JwtSerializer;
