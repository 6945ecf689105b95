use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GeminiConfig;

/// A generative-text backend: one prompt in, raw model text out.
///
/// The raw text carries no output discipline; callers are responsible for
/// digging their payload out of it.
pub trait TextModel: Send + Sync + 'static {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ModelError>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("provider quota exhausted")]
    QuotaExceeded,
    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned an empty response")]
    EmptyResponse,
}

impl ModelError {
    /// Transient errors worth another attempt: rate limits, server-side
    /// failures, and network blips. Client-side errors are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::QuotaExceeded => true,
            ModelError::Api { status, .. } => {
                matches!(*status, 408 | 500 | 502 | 503 | 504)
            }
            ModelError::Transport(_) => true,
            ModelError::EmptyResponse => false,
        }
    }
}

/// Bounded retry policy for provider calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
    retry: RetryConfig,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, retry: RetryConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            config,
            retry,
        })
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelError::QuotaExceeded);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        debug!(model = %self.config.model, chars = text.len(), "received model output");
        Ok(text)
    }
}

impl TextModel for GeminiClient {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ModelError>> {
        Box::pin(async move {
            let mut backoff = self.retry.initial_backoff;
            let mut attempt = 1;
            loop {
                match self.generate_once(prompt).await {
                    Ok(text) => return Ok(text),
                    Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                        warn!(attempt, error = %e, "model call failed, retrying");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.retry.max_backoff);
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ModelError::QuotaExceeded.is_retryable());
        assert!(ModelError::Transport("timed out".into()).is_retryable());
        assert!(
            ModelError::Api {
                status: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !ModelError::Api {
                status: 400,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!ModelError::EmptyResponse.is_retryable());
    }

    #[test]
    fn backoff_is_capped() {
        let retry = RetryConfig::default();
        let mut backoff = retry.initial_backoff;
        for _ in 0..10 {
            backoff = (backoff * 2).min(retry.max_backoff);
        }
        assert_eq!(backoff, retry.max_backoff);
    }
}
