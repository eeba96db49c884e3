//! Remote translation service

mod gemini;
mod request;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::{GeminiClient, GEMINI_API_BASE};
pub use request::TranslationRequest;

/// Errors returned by the remote model
#[derive(Debug, Clone, Error)]
pub enum TranslateError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("model returned no text")]
    Empty,
}

/// Text generation by a remote language model
#[async_trait]
pub trait Translator: Send + Sync {
    /// Run `prompt` through `model`, returning the trimmed, non-empty answer
    ///
    /// The credential is passed per call so a changed key applies to the
    /// next run.
    async fn generate(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, TranslateError>;
}
