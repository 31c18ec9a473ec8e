//! Session token issuance, verification, refresh, and revocation.

use crate::error::{token_excerpt, AuthError};
use crate::jwt::builder::SessionDescriptor;
use crate::jwt::claims::{RateLimitTier, SessionClaims};
use crate::jwt::serializer::JwtSerializer;
use crate::revocation::{RevocationRecord, RevocationStore};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of signing: the token plus the identifiers a caller may need
/// to persist or revoke later.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// The signed, self-contained token
    pub token: String,
    /// Unique identifier of this issuance
    pub jti: String,
    /// Session identifier carried by the token
    pub sid: String,
    /// When the token expires
    pub expires_at: DateTime<Utc>,
}

/// Signs, verifies, refreshes, and revokes session tokens.
///
/// Signing and verification are pure; the only I/O is the revocation
/// lookup, which is ordered last in `verify` and fails closed.
pub struct TokenService {
    serializer: JwtSerializer,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    store: Arc<dyn RevocationStore>,
    max_lifetime: Duration,
}

impl TokenService {
    /// Creates a service signing with the given secret.
    pub fn new(secret: &[u8], store: Arc<dyn RevocationStore>, max_lifetime: Duration) -> Self {
        Self {
            serializer: JwtSerializer::new(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            store,
            max_lifetime,
        }
    }

    /// Signs a new session token.
    ///
    /// Generates a fresh `jti`, sets `iat = now` and
    /// `exp = now + max_lifetime`, and derives the rate-limit tier from
    /// the roles. No side effects beyond token creation.
    pub fn sign(&self, descriptor: SessionDescriptor) -> Result<SignedToken, AuthError> {
        let now = Utc::now().timestamp();
        let jti = Uuid::new_v4().to_string();
        let sid = descriptor
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let claims = SessionClaims {
            sub: descriptor.identity.subject,
            email: descriptor.identity.email,
            email_verified: descriptor.identity.email_verified,
            name: descriptor.identity.name,
            picture: descriptor.identity.picture,
            tier: RateLimitTier::from_roles(&descriptor.roles),
            roles: descriptor.roles,
            iat: now,
            exp: now + self.max_lifetime.as_secs() as i64,
            jti: jti.clone(),
            sid: sid.clone(),
            last_activity: now,
        };

        let token = self.serializer.serialize(&claims, &self.encoding_key)?;

        info!(subject = %claims.sub, jti = %jti, "Signed session token");

        Ok(SignedToken {
            token,
            jti,
            sid,
            expires_at: timestamp_to_datetime(claims.exp),
        })
    }

    /// Verifies a token and returns its claims.
    ///
    /// Check order: signature (cheapest rejection of garbage), then
    /// structural claims, then expiry, then the revocation lookup. The
    /// lookup is the only store round-trip, so it comes last; if the
    /// store is unreachable the token is treated as revoked.
    pub async fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let claims = self.serializer.deserialize(token, &self.decoding_key)?;

        claims.validate_structure()?;

        let now = Utc::now().timestamp();
        if claims.is_expired_at(now) {
            return Err(AuthError::TokenExpired {
                expired_at: timestamp_to_datetime(claims.exp),
            });
        }

        match self.store.contains(&claims.jti).await {
            Ok(false) => Ok(claims),
            Ok(true) => Err(AuthError::TokenRevoked),
            Err(e) => {
                // Fail closed: store availability is a correctness
                // dependency for revocation.
                warn!(
                    jti = %claims.jti,
                    error = %e,
                    "Revocation store unavailable, denying token"
                );
                Err(AuthError::TokenRevoked)
            }
        }
    }

    /// Rotates a session token.
    ///
    /// The old token is verified and its `jti` revoked (reason
    /// "refresh") before the new token is minted, so once this returns,
    /// no subsequent `verify` of the old token can succeed. The new
    /// token carries the same identity and roles under a fresh `sid`.
    pub async fn refresh(&self, old_token: &str) -> Result<SignedToken, AuthError> {
        let claims = self.verify(old_token).await?;

        self.revoke(
            &claims.jti,
            Some(&claims.sub),
            Some(timestamp_to_datetime(claims.exp)),
            Some("refresh"),
        )
        .await?;

        let descriptor = SessionDescriptor {
            identity: crate::jwt::builder::ExternalIdentity {
                subject: claims.sub.clone(),
                email: claims.email,
                email_verified: claims.email_verified,
                name: claims.name,
                picture: claims.picture,
            },
            roles: claims.roles,
            session_id: None,
        };

        let signed = self.sign(descriptor)?;
        info!(
            subject = %claims.sub,
            old_jti = %claims.jti,
            new_jti = %signed.jti,
            "Refreshed session token"
        );
        Ok(signed)
    }

    /// Writes a revocation record for `jti`.
    ///
    /// Idempotent: revoking an already-revoked `jti` succeeds silently.
    /// When the original expiry is unknown the record is kept for the
    /// maximum lifetime, a safe ceiling.
    pub async fn revoke(
        &self,
        jti: &str,
        subject: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        reason: Option<&str>,
    ) -> Result<(), AuthError> {
        let expires_at = expires_at
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(self.max_lifetime.as_secs() as i64));

        let record = RevocationRecord::new(
            jti,
            subject.map(str::to_string),
            expires_at,
            reason.map(str::to_string),
        );

        self.store
            .add(record)
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("revocation write failed: {}", e)))?;

        info!(
            jti = %jti,
            subject = subject.unwrap_or("-"),
            reason = reason.unwrap_or("-"),
            "Revoked token"
        );
        Ok(())
    }

    /// Logs a diagnostic for a rejected token without exposing it.
    pub fn log_rejected(&self, token: &str, error: &AuthError) {
        warn!(
            token = %token_excerpt(token),
            error_code = error.code().as_str(),
            "Rejected token"
        );
    }
}

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}
