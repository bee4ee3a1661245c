//! Signed token encoding and decoding (HS256 JWT).

use super::clock::Clock;
use super::keys::KeyRing;
use crate::error::AuthError;
use crate::models::Role;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    /// Account id.
    pub uid: String,
    pub roles: Vec<Role>,
    pub iat: u64,
    pub exp: u64,
    /// Token id, the revocation key.
    pub jti: String,
}

impl Claims {
    pub fn new(
        username: &str,
        user_id: &str,
        roles: Vec<Role>,
        issued_at: u64,
        expires_at: u64,
    ) -> Self {
        Self {
            sub: username.to_string(),
            uid: user_id.to_string(),
            roles,
            iat: issued_at,
            exp: expires_at,
            jti: nanoid::nanoid!(21),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Encodes claims into signed tokens and checks tokens back into claims.
pub struct TokenCodec {
    keys: Arc<KeyRing>,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(keys: Arc<KeyRing>, clock: Arc<dyn Clock>) -> Self {
        Self { keys, clock }
    }

    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    /// Sign `claims` with the active key.
    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        let key = self.keys.active();
        let mut header = Header::new(ALGORITHM);
        header.kid = Some(key.kid().to_string());

        encode(&header, claims, &EncodingKey::from_secret(key.secret())).map_err(|e| {
            tracing::error!(error = %e, "Token signing failed");
            AuthError::Malformed
        })
    }

    /// Verify a token's signature and expiry and return its claims.
    ///
    /// Signature checks happen before expiry: an expired token with a bad
    /// signature reports `InvalidSignature`, an expired genuine one `Expired`.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let now = self.clock.now();
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;
        if header.alg != ALGORITHM {
            return Err(AuthError::Malformed);
        }

        let key = self
            .keys
            .verification_key(header.kid.as_deref(), now)
            .ok_or(AuthError::InvalidSignature)?;

        let mut validation = Validation::new(ALGORITHM);
        // Expiry is checked against the injected clock below, with no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp"]);

        let data = decode::<Claims>(token, &DecodingKey::from_secret(key.secret()), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::Malformed,
            })?;

        if data.claims.exp <= now {
            return Err(AuthError::Expired);
        }

        Ok(data.claims)
    }
}
