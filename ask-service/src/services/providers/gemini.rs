//! Gemini `generateContent` client.
//!
//! The API key travels in the `x-goog-api-key` header so it never shows up in
//! URLs, and therefore never in transport error messages.

use super::{CompletionClient, ProviderError, NO_RESPONSE_GENERATED};
use crate::services::credentials::ApiKey;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini API base URL.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Longest provider error body kept in a [`ProviderError::Api`].
const MAX_ERROR_BODY: usize = 512;

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Gemini completion client.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn api_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        credential: &ApiKey,
    ) -> Result<String, ProviderError> {
        let request = GenerateContentRequest::user_text(prompt);

        tracing::debug!(
            model = %model,
            prompt_len = prompt.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url(model))
            .header(API_KEY_HEADER, credential.expose())
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::RateLimited);
            }

            let mut message = response.text().await.unwrap_or_default();
            message.truncate(floor_char_boundary(&message, MAX_ERROR_BODY));
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let raw = response.text().await.map_err(transport_error)?;
        tracing::debug!(model = %model, raw = %raw, "Gemini raw response");

        let api_response: GenerateContentResponse = serde_json::from_str(&raw)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = &api_response.usage_metadata {
            tracing::info!(
                model = %model,
                input_tokens = usage.prompt_token_count.unwrap_or(0),
                output_tokens = usage.candidates_token_count.unwrap_or(0),
                "Gemini usage"
            );
        }

        let finish_reason = api_response.finish_reason().map(str::to_owned);
        let text = normalize_response(api_response);
        if text == NO_RESPONSE_GENERATED {
            tracing::warn!(
                model = %model,
                finish_reason = finish_reason.as_deref().unwrap_or("-"),
                "Gemini returned no text"
            );
        }

        Ok(text)
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(err.without_url().to_string())
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

/// Text carried by the first candidate, by the shape the provider used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateText {
    /// Content exposed a list of parts; parts without text count as empty.
    Parts(Vec<String>),
    /// Content exposed a single `text` field.
    Direct(String),
    /// No candidate, no content, or content with neither shape.
    Missing,
}

impl CandidateText {
    pub fn from_response(response: GenerateContentResponse) -> Self {
        let Some(content) = response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
        else {
            return CandidateText::Missing;
        };

        match (content.parts, content.text) {
            (Some(parts), _) => CandidateText::Parts(
                parts
                    .into_iter()
                    .map(|part| part.text.unwrap_or_default())
                    .collect(),
            ),
            (None, Some(text)) => CandidateText::Direct(text),
            (None, None) => CandidateText::Missing,
        }
    }

    /// Final answer text. Empty results collapse to [`NO_RESPONSE_GENERATED`].
    pub fn into_text(self) -> String {
        let text = match self {
            CandidateText::Parts(parts) => parts.join("\n").trim().to_string(),
            CandidateText::Direct(text) => text.trim().to_string(),
            CandidateText::Missing => String::new(),
        };

        if text.is_empty() {
            NO_RESPONSE_GENERATED.to_string()
        } else {
            text
        }
    }
}

pub fn normalize_response(response: GenerateContentResponse) -> String {
    CandidateText::from_response(response).into_text()
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

impl GenerateContentRequest {
    /// A single user turn holding `text` as its only part.
    pub fn user_text(text: &str) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: text.to_string(),
                }],
            }],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
    /// Why the first candidate stopped, e.g. `STOP` or `SAFETY`.
    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .as_ref()?
            .first()?
            .finish_reason
            .as_deref()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Option<Vec<ResponsePart>>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<i32>,
    pub candidates_token_count: Option<i32>,
}
