//! Bearer token validation
//!
//! Tokens are HS256 access tokens issued elsewhere; this service only checks the
//! signature and expiry and reads the user id from `sub`.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate a token and return the user id it was issued for
    pub fn validate(&self, token: &str) -> Result<Uuid> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::warn!("JWT validation failed: {}", e);
            AppError::Authentication(format!("Invalid token: {}", e))
        })?;

        Uuid::parse_str(&data.claims.sub).map_err(|e| {
            tracing::error!("Invalid user_id UUID in token: {}", e);
            AppError::Authentication("Invalid token: malformed user_id".to_string())
        })
    }
}
