use axum::{
    Json,
    extract::{Path, State},
};

use super::MessageResponse;
use crate::{AppState, auth::AuthUser, course, error::ApiResult, generator};

/// Cached or freshly generated lesson content for one of the caller's chapters.
#[utoipa::path(
    get,
    path = "/chapters/{id}/content",
    params(("id" = i64, Path, description = "Chapter id"))
)]
pub async fn content(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<generator::ChapterContent>> {
    let content = generator::chapter_content(&state.db, state.model.as_ref(), id, user.id).await?;
    Ok(Json(content))
}

/// Mark a chapter complete and unlock the next one in the same course.
#[utoipa::path(
    put,
    path = "/chapters/{id}/complete",
    params(("id" = i64, Path, description = "Chapter id"))
)]
pub async fn complete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    course::complete_chapter(&state.db, id, user.id).await?;
    Ok(Json(MessageResponse::new("Chapter completed")))
}
