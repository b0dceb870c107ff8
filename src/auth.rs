use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub exp: usize,
}

/// Resolves who is using the tracker right now.
pub trait AuthService: Send + Sync {
    fn current_user_id(&self) -> Option<Uuid>;
}

/// Identity fixed for the lifetime of a tracking session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionAuth {
    user_id: Option<Uuid>,
}

impl SessionAuth {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    /// Verifies `token` when one is given. An invalid token is an error, not
    /// a silent fallback to anonymous.
    pub fn from_token(token: Option<&str>, secret: &str) -> Result<Self, AppError> {
        match token {
            Some(token) => Ok(Self::user(verify_session_token(token, secret)?.sub)),
            None => Ok(Self::anonymous()),
        }
    }
}

impl AuthService for SessionAuth {
    fn current_user_id(&self) -> Option<Uuid> {
        self.user_id
    }
}

pub fn create_session_token(user_id: Uuid, ttl_seconds: u64, secret: &str) -> Result<String, AppError> {
    let claims = SessionClaims {
        sub: user_id,
        exp: (now_unix() + ttl_seconds) as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| AppError::Internal(format!("Failed to sign session token: {}", err)))
}

pub fn verify_session_token(token: &str, secret: &str) -> Result<SessionClaims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired session token".to_string()))?;
    Ok(token_data.claims)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("authorization")?;
    let raw = value.to_str().ok()?;
    raw.strip_prefix("Bearer ").map(|token| token.trim().to_string())
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
