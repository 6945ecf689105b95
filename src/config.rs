use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Runtime configuration, collected from the environment once at startup
/// and passed into [`crate::AppState`]. Secrets never live in CLI arguments.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub gemini: GeminiConfig,
    /// HS256 signing secret for access tokens.
    pub secret_key: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

const DEFAULT_MODEL: &str = "gemini-flash-latest";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

impl Config {
    /// Load configuration from the environment, reading `.env` if present.
    ///
    /// Required: `GEMINI_API_KEY`, `SECRET_KEY`.
    /// Optional: `GEMINI_MODEL`, `GEMINI_BASE_URL`.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let api_key = dotenvy::var("GEMINI_API_KEY").context("GEMINI_API_KEY is not set")?;
        let secret_key = dotenvy::var("SECRET_KEY").context("SECRET_KEY is not set")?;
        let model = dotenvy::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let base_url =
            dotenvy::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            gemini: GeminiConfig {
                api_key,
                model,
                base_url,
            },
            secret_key,
        })
    }
}
