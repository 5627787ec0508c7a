// core/common/src/auth.rs
// Session tokens issued after a phone number passes OTP verification

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Missing authorization header")]
    MissingAuth,
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

/// Claims carried by a signed-in session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Normalized phone number that passed verification
    pub sub: String,
    pub organisation_id: Uuid,
    /// Session id; keys the checkout held for this session
    pub sid: String,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn new(phone: String, organisation_id: Uuid, ttl_hours: u64) -> Self {
        let now = Utc::now().timestamp().max(0) as usize;

        Self {
            sub: phone,
            organisation_id,
            sid: Uuid::new_v4().to_string(),
            exp: now + (ttl_hours * 3600) as usize,
            iat: now,
        }
    }
}

#[derive(Clone)]
pub struct JwtManager {
    secret: String,
}

impl JwtManager {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Issue a session token for a verified phone number.
    pub fn create_session(
        &self,
        phone: &str,
        organisation_id: Uuid,
        ttl_hours: u64,
    ) -> Result<(String, Claims), AuthError> {
        let claims = Claims::new(phone.to_string(), organisation_id, ttl_hours);

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok((token, claims))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::default();

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &validation,
        ) {
            Ok(token_data) => Ok(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                match err.kind() {
                    ErrorKind::ExpiredSignature => Err(AuthError::TokenExpired),
                    _ => Err(AuthError::JwtError(err)),
                }
            }
        }
    }
}

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Result<String, AuthError> {
    match auth_header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(AuthError::InvalidToken),
    }
}
