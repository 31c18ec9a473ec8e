use crate::error::AuthError;
use crate::jwt::claims::SessionClaims;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

/// Encodes and decodes session claims as HS256 JWTs.
///
/// Decoding checks the signature only. Expiry and structural checks are
/// the caller's responsibility so that the verification order (signature,
/// structure, expiry, revocation) stays explicit.
pub struct JwtSerializer {
    algorithm: Algorithm,
}

impl JwtSerializer {
    /// Creates an HS256 serializer.
    pub fn new() -> Self {
        JwtSerializer {
            algorithm: Algorithm::HS256,
        }
    }

    /// Serializes and signs claims.
    pub fn serialize(
        &self,
        claims: &SessionClaims,
        key: &EncodingKey,
    ) -> Result<String, AuthError> {
        let header = Header::new(self.algorithm);
        encode(&header, claims, key).map_err(AuthError::from)
    }

    /// Verifies the signature and deserializes the payload.
    pub fn deserialize(&self, token: &str, key: &DecodingKey) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is checked explicitly after the structural checks.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let token_data = decode::<SessionClaims>(token, key, &validation)
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}

impl Default for JwtSerializer {
    fn default() -> Self {
        Self::new()
    }
}
