//! Prompt assembly and the hosted LLM client.
//!
//! The prompt pins the model to the supplied context and tells it to say
//! so when the answer is absent. Context assembly caps every retrieved
//! chunk before concatenation so prompt size stays bounded regardless of
//! chunk size — the cap is a required safeguard, not a tuning knob.
//!
//! [`GeminiModel`] issues exactly one outbound request per invocation and
//! never retries internally. HTTP 429 is the one distinguished failure
//! (rate limit); everything else is surfaced verbatim.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::index::ScoredChunk;

/// Reply the model is instructed to give when the context does not
/// contain the answer.
pub const NOT_FOUND_REPLY: &str = "Not found in the document";

/// Failure of one LLM invocation, inspected explicitly by the caller.
#[derive(Debug)]
pub enum LlmError {
    /// The provider signaled a rate limit (HTTP 429). The caller backs
    /// off and informs the user; the question is not resubmitted here.
    RateLimited,
    /// Any other failure, surfaced verbatim.
    Api(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::RateLimited => write!(f, "LLM provider rate limit exceeded"),
            LlmError::Api(e) => write!(f, "LLM request failed: {}", e),
        }
    }
}

impl std::error::Error for LlmError {}

/// Assemble the prompt context from retrieved chunks: each chunk capped
/// at `max_chars_per_chunk` characters, joined with blank lines, best
/// match first.
pub fn build_context(hits: &[ScoredChunk], max_chars_per_chunk: usize) -> String {
    hits.iter()
        .map(|hit| hit.chunk.text.chars().take(max_chars_per_chunk).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The fixed answer prompt. The template never varies; only the context
/// and question slots change.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Answer the question using ONLY the context below.\n\
         If the answer is not present, say \"{}\".\n\n\
         Context:\n{}\n\n\
         Question:\n{}\n",
        NOT_FOUND_REPLY, context, question
    )
}

/// Trait for the hosted answer model.
///
/// The session holds a `Box<dyn AnswerModel>` so tests can substitute a
/// scripted in-process implementation and count invocations.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-flash-latest"`).
    fn model_name(&self) -> &str;
    /// Send one prompt, get the raw text reply. Exactly one outbound
    /// call per invocation.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Client for the Google Generative Language `generateContent` endpoint.
pub struct GeminiModel {
    model: String,
    api_key: String,
    timeout: Duration,
    base_url: String,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig, api_key: String) -> Self {
        Self {
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

#[async_trait]
impl AnswerModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let resp = client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let status = resp.status();

        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }

        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!(
                "Gemini API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;
        parse_gemini_response(&json)
    }
}

/// Extract the reply text from a `generateContent` response: all text
/// parts of the first candidate, concatenated.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String, LlmError> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| LlmError::Api("Invalid Gemini response: missing candidates".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(LlmError::Api(
            "Invalid Gemini response: no text parts".to_string(),
        ));
    }

    Ok(text)
}
