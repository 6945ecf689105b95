use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// API error type. Every variant maps to a client-visible status and a
/// stable error code; nothing is downgraded to an opaque 500 on the way out.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Username already registered (409)
    #[error("Username already registered")]
    DuplicateUser,

    /// Wrong username or password (401)
    #[error("Incorrect username or password")]
    InvalidCredentials,

    /// Missing, malformed or mis-signed access token (401)
    #[error("Invalid authentication credentials")]
    Unauthenticated,

    /// Missing course/chapter (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Outline rejected before persisting (422)
    #[error("Invalid outline: {0}")]
    InvalidOutline(String),

    /// Provider quota exhausted; retryable (429)
    #[error("AI quota exhausted, try again shortly")]
    QuotaExceeded,

    /// Model answered without a parseable JSON payload; retryable (429)
    #[error("AI returned malformed output, try again shortly")]
    MalformedAiOutput,

    /// Outline generation failed for a non-retryable reason (502)
    #[error("Outline generation failed: {0}")]
    GenerationFailed(String),

    /// Chapter content generation failed for a non-retryable reason (502)
    #[error("Content generation failed: {0}")]
    ContentGenerationFailed(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Anything else (500)
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::DuplicateUser => (StatusCode::CONFLICT, "DUPLICATE_USER"),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::InvalidOutline(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_OUTLINE"),
            ApiError::QuotaExceeded => (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED"),
            ApiError::MalformedAiOutput => (StatusCode::TOO_MANY_REQUESTS, "MALFORMED_AI_OUTPUT"),
            ApiError::GenerationFailed(_) => (StatusCode::BAD_GATEWAY, "GENERATION_FAILED"),
            ApiError::ContentGenerationFailed(_) => {
                (StatusCode::BAD_GATEWAY, "CONTENT_GENERATION_FAILED")
            }
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
