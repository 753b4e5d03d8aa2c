use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    pub exp: i64,
}

/// Authenticated identity of a request. The role only gates routes; the core
/// resolves `user_id` to a golfer or caddie profile before touching a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require(&self, role: Role) -> AppResult<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }
}

/// HS256 bearer-token verification shared by HTTP routes and socket registration.
pub struct AuthEngine {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl AuthEngine {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verifies the token and returns the caller if successful.
    pub fn verify(&self, token: &str) -> Option<Caller> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(Caller {
                user_id: data.claims.user_id,
                role: data.claims.role,
            }),
            Err(e) => {
                warn!("Token validation failed: {e}");
                None
            }
        }
    }

    /// Signs a token valid for `ttl`. Used by the admin CLI and tests.
    pub fn issue(&self, user_id: Uuid, email: &str, role: Role, ttl: Duration) -> anyhow::Result<String> {
        let claims = Claims {
            user_id,
            email: email.to_string(),
            role,
            exp: (Utc::now() + ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn caller_from_headers(&self, headers: &HeaderMap) -> AppResult<Caller> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized("errors.unauthorized"))?;
        self.verify(token.trim())
            .ok_or(AppError::Unauthorized("errors.unauthorized"))
    }
}
