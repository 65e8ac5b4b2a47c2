use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{UserId, UserType},
    error::ApiError,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
}

/// The caller identity carried by a verified bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub user_type: UserType,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    uid: i64,
    user_type: UserType,
    iat: i64,
    exp: i64,
}

pub fn mint_token(
    cfg: &AuthConfig,
    user_id: UserId,
    user_type: UserType,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.token_ttl_seconds);
    let claims = Claims {
        sub: format!("user:{}", user_id.0),
        uid: user_id.0,
        user_type,
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )
}

pub fn verify_token(cfg: &AuthConfig, token: &str) -> Result<AuthenticatedUser, ApiError> {
    let data = decode::<Claims>(
        token.trim(),
        &DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ApiError::unauthorized(format!("invalid token: {e}")))?;
    Ok(AuthenticatedUser {
        user_id: UserId(data.claims.uid),
        user_type: data.claims.user_type,
    })
}

/// Hashes with Argon2id and returns the PHC string, salt and parameters included.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())?;
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Checks `password` against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
