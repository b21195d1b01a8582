/// LLM Client — the single point of entry for all Gemini API calls.
///
/// ARCHITECTURAL RULE: No other module may call the generation API directly.
/// All LLM interactions MUST go through this module.
///
/// The client makes exactly one attempt per call: retrying a failed or
/// rejected generation is the caller's decision, not the transport's.
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// The model used for all LLM calls.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "gemini-1.5-flash";
/// Call-level timeout. The upstream service imposes none of its own, so the
/// whole request budget lives here.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("generation API key is not configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("generation API returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: CandidateContent,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u32,
}

impl GeminiResponse {
    /// Extracts the text of the first candidate's first text part.
    pub fn text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .parts
            .iter()
            .find_map(|p| p.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

/// The single LLM client shared by all route handlers.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Makes one call to the Gemini API and returns the raw response text.
    /// A missing credential fails before any network I/O.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let request_body = GeminiRequest {
            system_instruction: Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system }],
            }),
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: prompt }],
            }],
        };

        let url = format!("{GEMINI_API_BASE}/{MODEL}:generateContent");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Try to parse the structured error message
            let message = serde_json::from_str::<GeminiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let gemini_response: GeminiResponse = response.json().await?;

        if let Some(usage) = &gemini_response.usage_metadata {
            debug!(
                "LLM call succeeded: prompt_tokens={}, candidate_tokens={}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        let text = gemini_response.text().ok_or(LlmError::EmptyContent)?;
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_extraction() {
        let json = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "hello"}, {"text": "ignored"}]}}
            ],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3}
        }"#;
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), Some("hello"));
        assert_eq!(response.usage_metadata.unwrap().prompt_token_count, 12);
    }

    #[test]
    fn test_response_without_candidates_has_no_text() {
        let response: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(response.text().is_none());
    }

    #[test]
    fn test_error_envelope_parses() {
        let json = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        let envelope: GeminiErrorEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.error.message, "API key not valid");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_io() {
        let client = GeminiClient::new(None);
        let err = client.call("prompt", "system").await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }
}
