//! Request guard pipeline.
//!
//! Runs the fixed ordering contract for every inbound request: IP filter
//! → security headers → request shape validation → rate-limit admission
//! → CSRF origin check (state-changing requests only) → token
//! verification → authorization. The business handler is the caller's;
//! the pipeline hands it verified claims or a terminal error, and a
//! security event is emitted for every security-relevant outcome.
//!
//! The ordering is a correctness property: rate limiting precedes
//! authentication so rejected traffic never costs signature or store
//! work, and authentication precedes authorization because authorization
//! is meaningless without verified claims.

use crate::audit::{SecurityEvent, SecurityEventCategory, SecurityEventSink, Severity};
use crate::authz::{authorize, Operation, Permission};
use crate::config::Config;
use crate::error::AuthError;
use crate::jwt::claims::SessionClaims;
use crate::rate_limit::{EndpointClass, RateLimitDecision, SlidingWindowLimiter};
use crate::token::TokenService;
use std::collections::HashSet;
use std::sync::Arc;

/// Longest path accepted before the request is rejected as malformed.
const MAX_PATH_LEN: usize = 2048;
/// Longest bearer token accepted.
const MAX_TOKEN_LEN: usize = 4096;

/// HTTP method of the inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Method {
    /// Whether the method can mutate state (and so needs the CSRF
    /// check).
    pub fn is_state_changing(&self) -> bool {
        !matches!(self, Method::Get | Method::Head | Method::Options)
    }
}

/// Everything the pipeline needs to know about one inbound request.
/// The HTTP layer builds this; the pipeline never touches the framework.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Client address
    pub client_ip: String,
    /// Client user agent
    pub user_agent: Option<String>,
    /// Origin header, when present
    pub origin: Option<String>,
    /// Request method
    pub method: Method,
    /// Request path (diagnostics and shape validation only)
    pub path: String,
    /// Bearer token, when supplied
    pub bearer_token: Option<String>,
    /// Partner context resolved by the business service for
    /// tenant-scoped routes
    pub partner_context: Option<String>,
}

/// Scope of a route's required permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    /// Global-scope operation (global-admin only)
    Global,
    /// Scoped to the request's resolved partner context
    Tenant,
}

/// Permission a route requires.
#[derive(Debug, Clone, Copy)]
pub struct RequiredPermission {
    /// Required operation
    pub operation: Operation,
    /// Where the operation applies
    pub scope: PermissionScope,
}

/// Per-route pipeline policy.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    /// Which rate-limit class applies
    pub endpoint_class: EndpointClass,
    /// Whether a verified token is required
    pub requires_auth: bool,
    /// Permission required beyond authentication
    pub required: Option<RequiredPermission>,
    /// Whether state-changing requests need the origin check
    pub csrf_protected: bool,
}

impl RoutePolicy {
    /// Public route: rate limited, nothing else.
    pub fn public() -> Self {
        Self {
            endpoint_class: EndpointClass::General,
            requires_auth: false,
            required: None,
            csrf_protected: false,
        }
    }

    /// Authentication endpoint (sign-in, refresh): strict limits, CSRF
    /// checked, no token required yet.
    pub fn auth_endpoint() -> Self {
        Self {
            endpoint_class: EndpointClass::Auth,
            requires_auth: false,
            required: None,
            csrf_protected: true,
        }
    }

    /// Route requiring authentication but no specific permission.
    pub fn authenticated() -> Self {
        Self {
            endpoint_class: EndpointClass::General,
            requires_auth: true,
            required: None,
            csrf_protected: true,
        }
    }

    /// Route requiring an operation within the request's partner
    /// context.
    pub fn tenant(operation: Operation) -> Self {
        Self {
            endpoint_class: EndpointClass::General,
            requires_auth: true,
            required: Some(RequiredPermission {
                operation,
                scope: PermissionScope::Tenant,
            }),
            csrf_protected: true,
        }
    }

    /// Route requiring a global-scope operation.
    pub fn global(operation: Operation) -> Self {
        Self {
            endpoint_class: EndpointClass::General,
            requires_auth: true,
            required: Some(RequiredPermission {
                operation,
                scope: PermissionScope::Global,
            }),
            csrf_protected: true,
        }
    }
}

/// Headers the HTTP layer attaches to every response.
pub fn security_headers() -> &'static [(&'static str, &'static str)] {
    &[
        ("X-Content-Type-Options", "nosniff"),
        ("X-Frame-Options", "DENY"),
        ("Referrer-Policy", "no-referrer"),
        ("Strict-Transport-Security", "max-age=31536000; includeSubDomains"),
        ("Cache-Control", "no-store"),
    ]
}

/// An admitted request, ready for the business handler.
#[derive(Debug, Clone)]
pub struct Admitted {
    /// Verified claims, when the route required authentication
    pub claims: Option<SessionClaims>,
    /// Rate-limit state for response headers
    pub rate: RateLimitDecision,
    /// Security headers to attach
    pub headers: &'static [(&'static str, &'static str)],
}

/// Orchestrates the guards in their fixed order.
pub struct Pipeline {
    tokens: Arc<TokenService>,
    limiter: Arc<SlidingWindowLimiter>,
    sink: Arc<dyn SecurityEventSink>,
    blocked_ips: HashSet<String>,
    allowed_origins: HashSet<String>,
}

impl Pipeline {
    /// Creates a pipeline over the shared engine components.
    pub fn new(
        tokens: Arc<TokenService>,
        limiter: Arc<SlidingWindowLimiter>,
        sink: Arc<dyn SecurityEventSink>,
        config: &Config,
    ) -> Self {
        Self {
            tokens,
            limiter,
            sink,
            blocked_ips: config.blocked_ips.clone(),
            allowed_origins: config.allowed_origins.clone(),
        }
    }

    /// Runs the guard chain for one request.
    ///
    /// Work committed before a failure (a rate-limit increment, a
    /// revocation write) stays committed; nothing here is transactional
    /// with the HTTP response.
    pub async fn handle(
        &self,
        ctx: &RequestContext,
        policy: &RoutePolicy,
    ) -> Result<Admitted, AuthError> {
        let result = self.run(ctx, policy).await;
        self.audit(ctx, &result).await;
        result
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        policy: &RoutePolicy,
    ) -> Result<Admitted, AuthError> {
        // 1. IP filter
        if self.blocked_ips.contains(&ctx.client_ip) {
            return Err(AuthError::IpBlocked);
        }

        // 2. Security headers are unconditional; they ride on Admitted
        // and on the error path the HTTP layer attaches them itself.

        // 3. Request shape
        validate_shape(ctx)?;

        // 4. Rate-limit admission, before any signature or store work
        let key = format!("{}:{}", ctx.client_ip, policy.endpoint_class.as_str());
        let rate = self.limiter.admit(&key, policy.endpoint_class).await;
        if !rate.allowed {
            return Err(AuthError::RateLimited {
                retry_after: rate.retry_after(),
            });
        }

        // 5. CSRF origin check, state-changing requests only
        if policy.csrf_protected && ctx.method.is_state_changing() {
            let origin_ok = ctx
                .origin
                .as_deref()
                .map(|o| self.allowed_origins.contains(o))
                .unwrap_or(false);
            if !origin_ok {
                return Err(AuthError::CsrfRejected);
            }
        }

        // 6. Authentication
        let needs_auth = policy.requires_auth || policy.required.is_some();
        let claims = if needs_auth {
            let token = ctx
                .bearer_token
                .as_deref()
                .ok_or(AuthError::AuthenticationRequired)?;
            match self.tokens.verify(token).await {
                Ok(claims) => Some(claims),
                Err(e) => {
                    self.tokens.log_rejected(token, &e);
                    return Err(e);
                }
            }
        } else {
            None
        };

        // 7. Authorization
        if let Some(required) = &policy.required {
            let claims = claims.as_ref().ok_or(AuthError::AuthenticationRequired)?;
            let permission = match required.scope {
                PermissionScope::Global => Permission::global(required.operation),
                PermissionScope::Tenant => {
                    let context = ctx
                        .partner_context
                        .clone()
                        .ok_or(AuthError::PartnerContextRequired)?;
                    Permission {
                        operation: required.operation,
                        context: Some(context),
                    }
                }
            };
            authorize(claims, &permission)?;
        }

        Ok(Admitted {
            claims,
            rate,
            headers: security_headers(),
        })
    }

    /// Emits the audit event for a terminal outcome.
    async fn audit(&self, ctx: &RequestContext, result: &Result<Admitted, AuthError>) {
        let mut event = match result {
            Ok(admitted) => match &admitted.claims {
                Some(claims) => SecurityEvent::new(
                    SecurityEventCategory::AuthenticationSuccess,
                    Severity::Info,
                )
                .with_subject(claims.sub.clone())
                .with_email(claims.email.clone()),
                // Nothing security-relevant happened on an anonymous
                // success.
                None => return,
            },
            Err(e) => {
                let (category, severity) = match e {
                    AuthError::RateLimited { .. } => {
                        (SecurityEventCategory::RateLimitExceeded, Severity::Warning)
                    }
                    AuthError::InvalidToken
                    | AuthError::TokenExpired { .. }
                    | AuthError::TokenRevoked
                    | AuthError::AuthenticationRequired => {
                        (SecurityEventCategory::AuthenticationFailure, Severity::Warning)
                    }
                    AuthError::InsufficientPermissions { .. }
                    | AuthError::PartnerContextRequired => {
                        (SecurityEventCategory::AuthorizationDenied, Severity::Warning)
                    }
                    AuthError::ValidationFailed { .. }
                    | AuthError::IpBlocked
                    | AuthError::CsrfRejected => {
                        (SecurityEventCategory::ValidationRejected, Severity::Warning)
                    }
                    _ => (SecurityEventCategory::UnhandledError, Severity::Critical),
                };

                let mut event = SecurityEvent::new(category, severity)
                    .with_detail("error_code", e.code().as_str());
                if let Some(retry_after) = e.retry_after() {
                    event = event.with_detail("retry_after_secs", retry_after.as_secs());
                }
                event
            }
        };

        event = event
            .with_client_ip(ctx.client_ip.clone())
            .with_detail("path", ctx.path.clone());
        if let Some(agent) = &ctx.user_agent {
            event = event.with_user_agent(agent.clone());
        }

        self.sink.record(event).await;
    }
}

fn validate_shape(ctx: &RequestContext) -> Result<(), AuthError> {
    if ctx.client_ip.is_empty() {
        return Err(AuthError::ValidationFailed {
            reason: "client address missing".to_string(),
        });
    }
    if ctx.path.len() > MAX_PATH_LEN {
        return Err(AuthError::ValidationFailed {
            reason: "path too long".to_string(),
        });
    }
    if let Some(token) = &ctx.bearer_token {
        if token.len() > MAX_TOKEN_LEN {
            return Err(AuthError::ValidationFailed {
                reason: "credential too long".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{MemoryEventWriter, PersistentSink};
    use crate::jwt::builder::{ClaimsBuilder, ExternalIdentity};
    use crate::jwt::claims::{Role, RoleAssignment};
    use crate::rate_limit::{InMemoryRateLimitStore, LimitSpec, RateLimits};
    use crate::revocation::InMemoryRevocationStore;
    use std::time::Duration;

    const SECRET: &[u8] = b"test-secret-key-for-testing-only";

    struct Harness {
        pipeline: Pipeline,
        tokens: Arc<TokenService>,
        writer: Arc<MemoryEventWriter>,
    }

    fn harness() -> Harness {
        let writer = Arc::new(MemoryEventWriter::new());
        let sink: Arc<dyn SecurityEventSink> = Arc::new(PersistentSink::new(writer.clone()));

        let tokens = Arc::new(TokenService::new(
            SECRET,
            Arc::new(InMemoryRevocationStore::new()),
            Duration::from_secs(14_400),
        ));

        let limits = RateLimits {
            general: LimitSpec {
                limit: 100,
                window: Duration::from_secs(60),
            },
            auth: LimitSpec {
                limit: 3,
                window: Duration::from_secs(60),
            },
        };
        let limiter = Arc::new(SlidingWindowLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            limits,
            sink.clone(),
        ));

        let mut config = Config {
            token_lifetime: Duration::from_secs(14_400),
            signing_key: SECRET.to_vec(),
            general_limit: 100,
            general_window: Duration::from_secs(60),
            auth_limit: 3,
            auth_window: Duration::from_secs(60),
            blocked_ips: HashSet::new(),
            allowed_origins: HashSet::new(),
            sweep_interval: Duration::from_secs(300),
        };
        config.blocked_ips.insert("10.66.0.1".to_string());
        config.allowed_origins.insert("https://app.example.com".to_string());

        let pipeline = Pipeline::new(tokens.clone(), limiter, sink, &config);
        Harness {
            pipeline,
            tokens,
            writer,
        }
    }

    fn ctx(token: Option<String>) -> RequestContext {
        RequestContext {
            client_ip: "203.0.113.5".to_string(),
            user_agent: Some("test-agent".to_string()),
            origin: Some("https://app.example.com".to_string()),
            method: Method::Post,
            path: "/api/services".to_string(),
            bearer_token: token,
            partner_context: Some("partner_42".to_string()),
        }
    }

    fn signed_token(tokens: &TokenService, role: RoleAssignment) -> String {
        let descriptor = ClaimsBuilder::new(ExternalIdentity {
            subject: "user-1".to_string(),
            email: "user@example.com".to_string(),
            email_verified: true,
            name: "User".to_string(),
            picture: None,
        })
        .role(role)
        .build()
        .unwrap();
        tokens.sign(descriptor).unwrap().token
    }

    #[tokio::test]
    async fn test_blocked_ip_rejected_before_anything_else() {
        let h = harness();
        let mut ctx = ctx(None);
        ctx.client_ip = "10.66.0.1".to_string();

        let err = h.pipeline.handle(&ctx, &RoutePolicy::public()).await.unwrap_err();
        assert!(matches!(err, AuthError::IpBlocked));
    }

    #[tokio::test]
    async fn test_missing_token_on_protected_route() {
        let h = harness();
        let err = h
            .pipeline
            .handle(&ctx(None), &RoutePolicy::authenticated())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn test_tenant_admin_allowed_in_own_context() {
        let h = harness();
        let token = signed_token(
            &h.tokens,
            RoleAssignment::tenant(Role::TenantAdmin, "partner_42", "system"),
        );

        let admitted = h
            .pipeline
            .handle(&ctx(Some(token)), &RoutePolicy::tenant(Operation::Admin))
            .await
            .unwrap();

        assert_eq!(admitted.claims.unwrap().sub, "user-1");
        assert!(!admitted.headers.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_context_denied() {
        let h = harness();
        let token = signed_token(
            &h.tokens,
            RoleAssignment::tenant(Role::TenantAdmin, "partner_99", "system"),
        );

        let err = h
            .pipeline
            .handle(&ctx(Some(token)), &RoutePolicy::tenant(Operation::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InsufficientPermissions { .. }));
    }

    #[tokio::test]
    async fn test_tenant_route_without_context() {
        let h = harness();
        let token = signed_token(
            &h.tokens,
            RoleAssignment::tenant(Role::TenantAdmin, "partner_42", "system"),
        );
        let mut ctx = ctx(Some(token));
        ctx.partner_context = None;

        let err = h
            .pipeline
            .handle(&ctx, &RoutePolicy::tenant(Operation::Read))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PartnerContextRequired));
    }

    #[tokio::test]
    async fn test_csrf_rejected_for_unlisted_origin() {
        let h = harness();
        let mut ctx = ctx(None);
        ctx.origin = Some("https://evil.example.com".to_string());

        let err = h
            .pipeline
            .handle(&ctx, &RoutePolicy::auth_endpoint())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CsrfRejected));
    }

    #[tokio::test]
    async fn test_csrf_skipped_for_reads() {
        let h = harness();
        let mut ctx = ctx(None);
        ctx.origin = None;
        ctx.method = Method::Get;

        // authenticated() is csrf_protected, but GET is not
        // state-changing; failure should be the missing token, not CSRF.
        let err = h
            .pipeline
            .handle(&ctx, &RoutePolicy::authenticated())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn test_rate_limit_precedes_authentication() {
        let h = harness();
        let mut ctx = ctx(Some("garbage-token".to_string()));
        ctx.method = Method::Get;

        let policy = RoutePolicy {
            endpoint_class: EndpointClass::Auth,
            requires_auth: true,
            required: None,
            csrf_protected: false,
        };

        // Exhaust the auth-class window (limit 3).
        for _ in 0..3 {
            let err = h.pipeline.handle(&ctx, &policy).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidToken));
        }

        // The garbage token must not even be inspected now.
        let err = h.pipeline.handle(&ctx, &policy).await.unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_oversized_path_rejected() {
        let h = harness();
        let mut ctx = ctx(None);
        ctx.path = "/".repeat(MAX_PATH_LEN + 1);

        let err = h.pipeline.handle(&ctx, &RoutePolicy::public()).await.unwrap_err();
        assert!(matches!(err, AuthError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn test_events_emitted_for_success_and_denial() {
        let h = harness();
        let token = signed_token(
            &h.tokens,
            RoleAssignment::tenant(Role::TenantMember, "partner_42", "system"),
        );

        h.pipeline
            .handle(&ctx(Some(token.clone())), &RoutePolicy::tenant(Operation::Read))
            .await
            .unwrap();
        h.pipeline
            .handle(&ctx(Some(token)), &RoutePolicy::tenant(Operation::Admin))
            .await
            .unwrap_err();

        let events = h.writer.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].category,
            SecurityEventCategory::AuthenticationSuccess
        );
        assert_eq!(events[0].subject.as_deref(), Some("user-1"));
        assert_eq!(
            events[1].category,
            SecurityEventCategory::AuthorizationDenied
        );
        assert_eq!(
            events[1].detail["error_code"],
            "AUTH_INSUFFICIENT_PERMISSIONS"
        );
    }

    #[tokio::test]
    async fn test_anonymous_success_emits_no_event() {
        let h = harness();
        let mut ctx = ctx(None);
        ctx.method = Method::Get;

        h.pipeline.handle(&ctx, &RoutePolicy::public()).await.unwrap();
        assert!(h.writer.events().await.is_empty());
    }
}
