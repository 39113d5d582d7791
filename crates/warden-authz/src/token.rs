//! EdDSA access token verification.
//!
//! Tokens are issued by the session collaborator; this crate only needs
//! the actor id out of a verified token. Issuance is kept for operators
//! and tests.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthzConfig;
use crate::error::AuthzError;

/// JWT claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject — actor ID (UUID string).
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Unique token ID (UUID string).
    pub jti: String,
}

/// Issue a signed EdDSA (Ed25519) JWT access token for `actor_id`.
pub fn issue_access_token(actor_id: Uuid, config: &AuthzConfig) -> Result<String, AuthzError> {
    let now = Utc::now().timestamp();
    let claims = AccessTokenClaims {
        sub: actor_id.to_string(),
        iss: config.jwt_issuer.clone(),
        iat: now,
        exp: now + config.access_token_lifetime_secs as i64,
        jti: Uuid::new_v4().to_string(),
    };

    let key = EncodingKey::from_ed_pem(config.jwt_private_key_pem.as_bytes())
        .map_err(|e| AuthzError::Crypto(format!("bad private key: {e}")))?;

    let header = Header::new(Algorithm::EdDSA);
    jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| AuthzError::Crypto(format!("JWT encode: {e}")))
}

/// Verifies access tokens against one public key and issuer.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(config: &AuthzConfig) -> Result<Self, AuthzError> {
        let key = DecodingKey::from_ed_pem(config.jwt_public_key_pem.as_bytes())
            .map_err(|e| AuthzError::Crypto(format!("bad public key: {e}")))?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&[&config.jwt_issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

        Ok(Self { key, validation })
    }

    /// Verify signature, expiry and issuer, returning the claims.
    pub fn decode(&self, token: &str) -> Result<AccessTokenClaims, AuthzError> {
        jsonwebtoken::decode::<AccessTokenClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthzError::TokenExpired,
                _ => AuthzError::TokenInvalid(e.to_string()),
            })
    }

    /// Verify a token and return the actor it was issued to.
    pub fn actor_id(&self, token: &str) -> Result<Uuid, AuthzError> {
        let claims = self.decode(token)?;
        Uuid::parse_str(&claims.sub)
            .map_err(|e| AuthzError::TokenInvalid(format!("subject is not a UUID: {e}")))
    }
}
