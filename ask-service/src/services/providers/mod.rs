//! Completion provider abstraction and implementations.
//!
//! The handler only ever talks to [`CompletionClient`]; the Gemini client is
//! the production implementation and the mock is used by tests.

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::services::credentials::ApiKey;

/// Returned when the provider answered but produced no usable text.
pub const NO_RESPONSE_GENERATED: &str = "No response generated";

/// Failure of a single completion call made with a single credential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited")]
    RateLimited,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// One-shot text completion against an external generative model.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends `prompt` as a single user turn to `model`, authenticated with
    /// `credential`, and returns the normalized answer text.
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        credential: &ApiKey,
    ) -> Result<String, ProviderError>;
}
