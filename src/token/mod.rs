//! Bearer token verification.
//!
//! The router only needs something implementing [`TokenValidator`]; [`JwtValidator`]
//! is the stock implementation backed by `jsonwebtoken`.

mod claims;

pub use claims::{Claims, EXPIRY_CLAIM, PERMISSIONS_CLAIM};

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::permission::PermissionRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("invalid Authorization header format")]
    InvalidHeader,

    #[error("Authorization header must use Bearer token format")]
    NotBearer,

    #[error("empty bearer token")]
    EmptyToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid verification key: {0}")]
    InvalidKey(String),

    #[error("token exp field not present")]
    MissingExpiry,

    #[error("token is expired")]
    Expired,

    #[error("no permission found in the token")]
    MissingPermissions,

    #[error("invalid permissions value, value not supported")]
    InvalidPermissions,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(err.to_string())
    }
}

/// Verifies the credentials carried by a request and returns its claims.
///
/// Implementations must make sure the returned claims carry a usable
/// permission claim; the router rejects the request otherwise.
#[async_trait]
pub trait TokenValidator: Send + Sync + 'static {
    async fn verify(&self, headers: &HeaderMap) -> Result<Claims, AuthError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader)?;

    let token = value.strip_prefix("Bearer ").ok_or(AuthError::NotBearer)?;
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::EmptyToken);
    }
    Ok(token)
}

/// JWT validator: signature checks are done by `jsonwebtoken`, the expiry and
/// permission claims are checked here.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
    registry: PermissionRegistry,
    leeway: i64,
}

impl JwtValidator {
    pub fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        // exp is checked by Claims::validate so a missing claim gets its own error
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            key,
            validation,
            registry: PermissionRegistry::default(),
            leeway: 0,
        }
    }

    /// RS256 validator from a PEM encoded public key
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, AuthError> {
        let key =
            DecodingKey::from_rsa_pem(pem).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(Self::new(key, Algorithm::RS256))
    }

    /// HS256 validator from a shared secret
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::new(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    pub fn with_registry(mut self, registry: PermissionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = i64::try_from(seconds).unwrap_or(i64::MAX);
        self
    }

    /// Decode and check a raw token
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Map<String, Value>>(token, &self.key, &self.validation)?;
        let claims = Claims::new(data.claims);
        claims.validate(&self.registry, Utc::now().timestamp(), self.leeway)?;
        Ok(claims)
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn verify(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let token = bearer_token(headers)?;
        self.verify_token(token)
    }
}
