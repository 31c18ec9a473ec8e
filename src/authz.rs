//! Context-scoped role authorization.
//!
//! [`authorize`] is the only place permission logic lives; nothing else
//! in the engine (or its callers) matches on roles directly. Ownership
//! of a specific resource is the business service's lookup; it resolves
//! the target context id and supplies it here honestly.

use crate::error::AuthError;
use crate::jwt::claims::{Role, SessionClaims};
use tracing::debug;

/// The two operation classes a route can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read access to tenant data
    Read,
    /// Administrative access to tenant data
    Admin,
}

impl Operation {
    /// Stable name for logs and error detail.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Admin => "admin",
        }
    }
}

/// A required permission: an operation, optionally scoped to a partner
/// context. A `None` context means a global-scope operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    /// Required operation
    pub operation: Operation,
    /// Target context, resolved by the caller from the resource being
    /// accessed; never inferred from the subject's roles
    pub context: Option<String>,
}

impl Permission {
    /// Read permission within a partner context.
    pub fn read(context: impl Into<String>) -> Self {
        Self {
            operation: Operation::Read,
            context: Some(context.into()),
        }
    }

    /// Admin permission within a partner context.
    pub fn admin(context: impl Into<String>) -> Self {
        Self {
            operation: Operation::Admin,
            context: Some(context.into()),
        }
    }

    /// A global-scope operation (global-admin only).
    pub fn global(operation: Operation) -> Self {
        Self {
            operation,
            context: None,
        }
    }
}

/// Evaluates verified claims against a required permission.
///
/// 1. Any global-admin assignment allows unconditionally.
/// 2. Without a target context, only global-admin may act; deny.
/// 3. Otherwise scan assignments for a matching context: read is
///    satisfied by tenant-admin or tenant-member, admin by tenant-admin
///    only.
/// 4. No match denies.
pub fn authorize(claims: &SessionClaims, required: &Permission) -> Result<(), AuthError> {
    if claims.has_role(Role::GlobalAdmin) {
        return Ok(());
    }

    let deny = || {
        debug!(
            subject = %claims.sub,
            operation = required.operation.as_str(),
            context = required.context.as_deref().unwrap_or("-"),
            "Authorization denied"
        );
        Err(AuthError::InsufficientPermissions {
            operation: required.operation.as_str().to_string(),
            context: required.context.clone(),
        })
    };

    let Some(target) = required.context.as_deref() else {
        return deny();
    };

    let satisfied = claims
        .roles
        .iter()
        .filter(|a| a.context_id.as_deref() == Some(target))
        .any(|a| match required.operation {
            Operation::Read => matches!(a.role, Role::TenantAdmin | Role::TenantMember),
            Operation::Admin => a.role == Role::TenantAdmin,
        });

    if satisfied {
        Ok(())
    } else {
        deny()
    }
}
