use crate::error::AuthError;
use serde::{Deserialize, Serialize};

/// Role names are a closed set; permission logic never matches on raw
/// strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    /// Unrestricted access across all contexts
    #[serde(rename = "GLOBAL_ADMIN")]
    GlobalAdmin,
    /// Administrative access within one partner context
    #[serde(rename = "TENANT_ADMIN")]
    TenantAdmin,
    /// Read access within one partner context
    #[serde(rename = "TENANT_MEMBER")]
    TenantMember,
}

impl Role {
    /// Whether this role is scoped to a partner context
    pub fn is_tenant_scoped(&self) -> bool {
        matches!(self, Role::TenantAdmin | Role::TenantMember)
    }
}

/// One role granted to a subject, optionally scoped to a partner context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleAssignment {
    /// The granted role
    pub role: Role,
    /// Partner context the role applies to; absent for global roles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// When the role was granted (unix seconds)
    pub granted_at: i64,
    /// Identity that granted the role
    pub granted_by: String,
}

impl RoleAssignment {
    /// Creates a global-admin assignment.
    pub fn global_admin(granted_by: impl Into<String>) -> Self {
        Self {
            role: Role::GlobalAdmin,
            context_id: None,
            granted_at: chrono::Utc::now().timestamp(),
            granted_by: granted_by.into(),
        }
    }

    /// Creates a tenant-scoped assignment.
    pub fn tenant(role: Role, context_id: impl Into<String>, granted_by: impl Into<String>) -> Self {
        Self {
            role,
            context_id: Some(context_id.into()),
            granted_at: chrono::Utc::now().timestamp(),
            granted_by: granted_by.into(),
        }
    }

    /// A tenant-scoped role without a context id is invalid, as is a
    /// global role carrying one.
    pub fn is_well_formed(&self) -> bool {
        match self.role {
            Role::GlobalAdmin => self.context_id.is_none(),
            Role::TenantAdmin | Role::TenantMember => self.context_id.is_some(),
        }
    }
}

/// Rate-limit tier derived from the subject's roles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RateLimitTier {
    /// Default tier
    #[serde(rename = "standard")]
    Standard,
    /// Elevated tier for administrative subjects
    #[serde(rename = "privileged")]
    Privileged,
}

impl RateLimitTier {
    /// Derives the tier from a set of role assignments.
    pub fn from_roles(roles: &[RoleAssignment]) -> Self {
        let admin = roles
            .iter()
            .any(|r| matches!(r.role, Role::GlobalAdmin | Role::TenantAdmin));
        if admin {
            RateLimitTier::Privileged
        } else {
            RateLimitTier::Standard
        }
    }
}

/// The verified identity carried through a request.
///
/// Owned by the request that produced it; nothing here is shared across
/// requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Opaque subject identifier
    pub sub: String,
    /// Subject email
    pub email: String,
    /// Whether the identity provider verified the email
    pub email_verified: bool,
    /// Display name
    pub name: String,
    /// Avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Ordered role assignments
    pub roles: Vec<RoleAssignment>,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds); `exp - iat` never exceeds the configured
    /// maximum lifetime
    pub exp: i64,
    /// Unique identifier of this token issuance
    pub jti: String,
    /// Session identifier, rotated on refresh
    pub sid: String,
    /// Rate-limit tier derived from roles at issuance
    pub tier: RateLimitTier,
    /// Last activity (unix seconds), refreshed on token rotation
    pub last_activity: i64,
}

impl SessionClaims {
    /// Whether the token has expired at `now` (strict comparison, no
    /// skew allowance).
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }

    /// Structural check: claims missing `jti`, `sid`, or `sub` are
    /// rejected, as are malformed role assignments.
    pub fn validate_structure(&self) -> Result<(), AuthError> {
        if self.sub.is_empty() || self.jti.is_empty() || self.sid.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        if self.roles.iter().any(|r| !r.is_well_formed()) {
            return Err(AuthError::InvalidToken);
        }
        Ok(())
    }

    /// Whether any assignment carries the given role.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r.role == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_with_roles(roles: Vec<RoleAssignment>) -> SessionClaims {
        let now = chrono::Utc::now().timestamp();
        SessionClaims {
            sub: "user-1".to_string(),
            email: "user@example.com".to_string(),
            email_verified: true,
            name: "User".to_string(),
            picture: None,
            roles,
            iat: now,
            exp: now + 3600,
            jti: "jti-1".to_string(),
            sid: "sid-1".to_string(),
            tier: RateLimitTier::Standard,
            last_activity: now,
        }
    }

    #[test]
    fn test_tenant_role_without_context_is_malformed() {
        let assignment = RoleAssignment {
            role: Role::TenantAdmin,
            context_id: None,
            granted_at: 0,
            granted_by: "system".to_string(),
        };
        assert!(!assignment.is_well_formed());

        let claims = claims_with_roles(vec![assignment]);
        assert!(matches!(
            claims.validate_structure(),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_global_admin_with_context_is_malformed() {
        let assignment = RoleAssignment {
            role: Role::GlobalAdmin,
            context_id: Some("partner_1".to_string()),
            granted_at: 0,
            granted_by: "system".to_string(),
        };
        assert!(!assignment.is_well_formed());
    }

    #[test]
    fn test_missing_identifiers_rejected() {
        let mut claims = claims_with_roles(vec![]);
        claims.jti = String::new();
        assert!(claims.validate_structure().is_err());

        let mut claims = claims_with_roles(vec![]);
        claims.sid = String::new();
        assert!(claims.validate_structure().is_err());

        let mut claims = claims_with_roles(vec![]);
        claims.sub = String::new();
        assert!(claims.validate_structure().is_err());
    }

    #[test]
    fn test_expiry_is_strict() {
        let claims = claims_with_roles(vec![]);
        assert!(claims.is_expired_at(claims.exp));
        assert!(!claims.is_expired_at(claims.exp - 1));
    }

    #[test]
    fn test_tier_derivation() {
        let member = claims_with_roles(vec![RoleAssignment::tenant(
            Role::TenantMember,
            "partner_1",
            "system",
        )]);
        assert_eq!(RateLimitTier::from_roles(&member.roles), RateLimitTier::Standard);

        let admin = claims_with_roles(vec![RoleAssignment::tenant(
            Role::TenantAdmin,
            "partner_1",
            "system",
        )]);
        assert_eq!(
            RateLimitTier::from_roles(&admin.roles),
            RateLimitTier::Privileged
        );
    }

    #[test]
    fn test_role_serde_names() {
        let json = serde_json::to_string(&Role::GlobalAdmin).unwrap();
        assert_eq!(json, "\"GLOBAL_ADMIN\"");
        let role: Role = serde_json::from_str("\"TENANT_MEMBER\"").unwrap();
        assert_eq!(role, Role::TenantMember);
    }
}
