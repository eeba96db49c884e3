//! Google Gemini `generateContent` client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{TranslateError, Translator};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

pub struct GeminiClient {
    client: Client,
    api_base: String,
}

impl GeminiClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, TranslateError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslateError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, model)
    }
}

#[async_trait]
impl Translator for GeminiClient {
    async fn generate(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, TranslateError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!(model, prompt_chars = prompt.chars().count(), "calling generateContent");

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(classify)?;
        extract_text(&body)
    }
}

fn classify(e: reqwest::Error) -> TranslateError {
    if e.is_timeout() {
        TranslateError::Timeout
    } else {
        TranslateError::Network(e.to_string())
    }
}

/// Concatenate the text parts of the first candidate
fn extract_text(body: &str) -> Result<String, TranslateError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| TranslateError::Malformed(e.to_string()))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(TranslateError::Empty);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello, "}, {"text": "world\n"}]},
                "finishReason": "STOP"
            }]
        }"#;
        assert_eq!(extract_text(body).unwrap(), "Hello, world");
    }

    #[test]
    fn test_extract_text_empty_candidates() {
        assert!(matches!(extract_text(r#"{"candidates": []}"#), Err(TranslateError::Empty)));
        assert!(matches!(extract_text(r#"{}"#), Err(TranslateError::Empty)));
        let blocked = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        assert!(matches!(extract_text(blocked), Err(TranslateError::Empty)));
    }

    #[test]
    fn test_extract_text_whitespace_only_is_empty() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "  \n "}]}}]}"#;
        assert!(matches!(extract_text(body), Err(TranslateError::Empty)));
    }

    #[test]
    fn test_extract_text_malformed() {
        assert!(matches!(extract_text("<html>"), Err(TranslateError::Malformed(_))));
    }

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: "Translate:\n\nbonjour" }],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Translate:\n\nbonjour");
    }

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint("gemini-2.5-flash"),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
