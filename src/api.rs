pub mod auth;
pub mod chapters;
pub mod courses;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Plain acknowledgment body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}
