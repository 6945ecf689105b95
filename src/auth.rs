use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use axum::{RequestPartsExt, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{AppState, error::ApiError};

/// A registered account. Immutable after creation; the email column is
/// reserved and stays unset for now.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
}

/// Token signing material, derived from the configured secret once at startup.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

const TOKEN_LIFETIME_DAYS: i64 = 7;

pub async fn register(
    database: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<i64, ApiError> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(database)
        .await?;
    if existing.is_some() {
        return Err(ApiError::DuplicateUser);
    }
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, ?)")
        .bind(username)
        .bind(&password_hash)
        .execute(database)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Verify credentials and issue a signed access token carrying the username.
pub async fn login(
    database: &SqlitePool,
    keys: &JwtKeys,
    username: &str,
    password: &str,
) -> Result<String, ApiError> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT password_hash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(database)
            .await?;
    let Some((password_hash,)) = row else {
        return Err(ApiError::InvalidCredentials);
    };
    let parsed_hash = PasswordHash::new(&password_hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(ApiError::InvalidCredentials);
    }
    issue_token(keys, username)
}

pub fn issue_token(keys: &JwtKeys, username: &str) -> Result<String, ApiError> {
    let exp = (time::OffsetDateTime::now_utc() + time::Duration::days(TOKEN_LIFETIME_DAYS))
        .unix_timestamp();
    let claims = Claims {
        sub: username.to_string(),
        exp,
    };
    let token = encode(&Header::default(), &claims, &keys.encoding)
        .map_err(|e| anyhow::anyhow!("Failed to sign token: {}", e))?;
    Ok(token)
}

/// Resolve a bearer token to the current user. Fails if the token is
/// malformed, mis-signed, or the encoded username no longer exists.
pub async fn authenticate(
    database: &SqlitePool,
    keys: &JwtKeys,
    token: &str,
) -> Result<User, ApiError> {
    let claims = decode::<Claims>(token, &keys.decoding, &Validation::default())
        .map_err(|_| ApiError::Unauthenticated)?
        .claims;
    let user = sqlx::query_as::<_, User>("SELECT id, username, email FROM users WHERE username = ?")
        .bind(&claims.sub)
        .fetch_optional(database)
        .await?;
    user.ok_or(ApiError::Unauthenticated)
}

/// Extractor for handlers behind bearer auth.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ApiError::Unauthenticated)?;
        let user = authenticate(&state.db, &state.jwt, bearer.token()).await?;
        Ok(AuthUser(user))
    }
}
