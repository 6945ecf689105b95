use axum::{Json, extract::State};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    AppState,
    auth::AuthUser,
    course::{self, CourseDetail, CourseOutline, CourseSummary},
    error::ApiResult,
    generator,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PreviewRequest {
    pub topic: String,
}

/// Generate an outline for a topic without persisting anything.
#[utoipa::path(post, path = "/generate-preview", request_body = PreviewRequest)]
pub async fn generate_preview(
    State(state): State<AppState>,
    Json(req): Json<PreviewRequest>,
) -> ApiResult<Json<CourseOutline>> {
    let outline = generator::generate_outline(state.model.as_ref(), &req.topic).await?;
    Ok(Json(outline))
}

/// Persist a previewed outline; chapter 1 comes back unlocked, the rest locked.
#[utoipa::path(post, path = "/courses", request_body = CourseOutline)]
pub async fn save_course(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(outline): Json<CourseOutline>,
) -> ApiResult<Json<CourseDetail>> {
    let saved = course::save_course(&state.db, user.id, &outline).await?;
    Ok(Json(saved))
}

#[utoipa::path(get, path = "/my-courses")]
pub async fn my_courses(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<CourseSummary>>> {
    let courses = course::list_courses(&state.db, user.id).await?;
    Ok(Json(courses))
}
