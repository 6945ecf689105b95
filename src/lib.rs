pub mod ai;
pub mod api;
pub mod auth;
pub mod config;
pub mod course;
pub mod db;
pub mod error;
pub mod generator;
pub mod utils;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{get, post, put},
};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{ai::TextModel, auth::JwtKeys};

pub use crate::error::{ApiError, ApiResult};

/// Shared application state, cloned into every handler. Built once at
/// startup from [`config::Config`]; no global singletons.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub model: Arc<dyn TextModel>,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(db: SqlitePool, model: Arc<dyn TextModel>, jwt: JwtKeys) -> Self {
        Self {
            db,
            model,
            jwt: Arc::new(jwt),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::auth::register,
        api::auth::token,
        api::courses::generate_preview,
        api::courses::save_course,
        api::courses::my_courses,
        api::chapters::content,
        api::chapters::complete,
    ),
    components(schemas(
        api::MessageResponse,
        api::auth::RegisterRequest,
        api::auth::TokenRequest,
        api::auth::TokenResponse,
        api::courses::PreviewRequest,
        course::CourseOutline,
        course::OutlineChapter,
        course::CourseDetail,
        course::ChapterDetail,
        course::CourseSummary,
        course::ChapterStatus,
        generator::ChapterContent,
        generator::Quiz,
    ))
)]
struct ApiDoc;

const REQUEST_DEADLINE: Duration = Duration::from_secs(120);

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/register", post(api::auth::register))
        .route("/token", post(api::auth::token))
        .route("/generate-preview", post(api::courses::generate_preview))
        .route("/courses", post(api::courses::save_course))
        .route("/my-courses", get(api::courses::my_courses))
        .route("/chapters/{id}/content", get(api::chapters::content))
        .route("/chapters/{id}/complete", put(api::chapters::complete))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(REQUEST_DEADLINE))
}
