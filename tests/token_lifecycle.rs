//! End-to-end token lifecycle scenarios through the public API.

use session_auth::jwt::{ClaimsBuilder, ExternalIdentity, Role, RoleAssignment};
use session_auth::revocation::InMemoryRevocationStore;
use session_auth::token::TokenService;
use session_auth::{authz, AuthError, Operation, Permission};
use std::sync::Arc;
use std::time::Duration;

const SECRET: &[u8] = b"integration-test-secret-32-bytes";

fn service() -> TokenService {
    TokenService::new(
        SECRET,
        Arc::new(InMemoryRevocationStore::new()),
        Duration::from_secs(14_400),
    )
}

fn tenant_admin_descriptor() -> session_auth::jwt::SessionDescriptor {
    ClaimsBuilder::new(ExternalIdentity {
        subject: "u1".to_string(),
        email: "u1@example.com".to_string(),
        email_verified: true,
        name: "User One".to_string(),
        picture: None,
    })
    .role(RoleAssignment::tenant(Role::TenantAdmin, "partner_42", "admin-console"))
    .build()
    .unwrap()
}

#[tokio::test]
async fn sign_verify_authorize_in_own_context() {
    let service = service();
    let a = service.sign(tenant_admin_descriptor()).unwrap();

    let claims = service.verify(&a.token).await.unwrap();
    assert_eq!(claims.sub, "u1");

    assert!(authz::authorize(&claims, &Permission::admin("partner_42")).is_ok());
    assert!(authz::authorize(&claims, &Permission::admin("partner_99")).is_err());
}

#[tokio::test]
async fn refresh_rotates_session_and_kills_old_token() {
    let service = service();
    let a = service.sign(tenant_admin_descriptor()).unwrap();
    let a_claims = service.verify(&a.token).await.unwrap();

    let b = service.refresh(&a.token).await.unwrap();

    assert!(matches!(
        service.verify(&a.token).await,
        Err(AuthError::TokenRevoked)
    ));

    let b_claims = service.verify(&b.token).await.unwrap();
    assert_eq!(b_claims.sub, a_claims.sub);
    assert_eq!(b_claims.roles, a_claims.roles);
    assert_ne!(b_claims.sid, a_claims.sid);
}

#[tokio::test]
async fn chained_refresh_invalidates_each_predecessor() {
    let service = service();
    let a = service.sign(tenant_admin_descriptor()).unwrap();
    let b = service.refresh(&a.token).await.unwrap();
    let c = service.refresh(&b.token).await.unwrap();

    assert!(service.verify(&a.token).await.is_err());
    assert!(service.verify(&b.token).await.is_err());
    assert!(service.verify(&c.token).await.is_ok());
}

#[tokio::test]
async fn logout_revocation_is_idempotent_and_final() {
    let service = service();
    let a = service.sign(tenant_admin_descriptor()).unwrap();

    service
        .revoke(&a.jti, Some("u1"), Some(a.expires_at), Some("logout"))
        .await
        .unwrap();
    service
        .revoke(&a.jti, Some("u1"), Some(a.expires_at), Some("logout"))
        .await
        .unwrap();

    assert!(matches!(
        service.verify(&a.token).await,
        Err(AuthError::TokenRevoked)
    ));
}

#[tokio::test]
async fn global_admin_crosses_every_context() {
    let service = service();
    let descriptor = ClaimsBuilder::new(ExternalIdentity {
        subject: "root".to_string(),
        email: "root@example.com".to_string(),
        email_verified: true,
        name: "Root".to_string(),
        picture: None,
    })
    .role(RoleAssignment::global_admin("bootstrap"))
    .build()
    .unwrap();

    let signed = service.sign(descriptor).unwrap();
    let claims = service.verify(&signed.token).await.unwrap();

    assert!(authz::authorize(&claims, &Permission::read("partner_1")).is_ok());
    assert!(authz::authorize(&claims, &Permission::admin("partner_2")).is_ok());
    assert!(authz::authorize(&claims, &Permission::global(Operation::Admin)).is_ok());
}
