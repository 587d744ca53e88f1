//! Credential-aware generation on top of a [`CompletionClient`].
//!
//! Two key policies are supported. Under [`KeyStrategy::Rotate`] every call
//! takes one key from the shared [`CredentialRotator`] and makes exactly one
//! attempt. Under [`KeyStrategy::Fallback`] the pool is walked in order, one
//! attempt per key, until a key succeeds.

use crate::services::credentials::{CredentialPool, CredentialRotator};
use crate::services::providers::{CompletionClient, ProviderError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    #[default]
    Rotate,
    Fallback,
}

impl KeyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStrategy::Rotate => "rotate",
            KeyStrategy::Fallback => "fallback",
        }
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rotate" | "rotation" => Ok(KeyStrategy::Rotate),
            "fallback" => Ok(KeyStrategy::Fallback),
            other => Err(format!(
                "unknown key strategy '{}', expected 'rotate' or 'fallback'",
                other
            )),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("all {attempts} credentials failed")]
    AllProvidersExhausted { attempts: usize },
}

pub struct Generator {
    client: Arc<dyn CompletionClient>,
    pool: CredentialPool,
    rotator: Arc<CredentialRotator>,
    strategy: KeyStrategy,
    model: String,
}

impl Generator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        pool: CredentialPool,
        rotator: Arc<CredentialRotator>,
        strategy: KeyStrategy,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            pool,
            rotator,
            strategy,
            model: model.into(),
        }
    }

    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn rotator(&self) -> &CredentialRotator {
        &self.rotator
    }

    /// Generates a completion for `prompt` using the configured key policy.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        match self.strategy {
            KeyStrategy::Rotate => self.complete_with_rotation(prompt).await,
            KeyStrategy::Fallback => self.complete_with_fallback(prompt).await,
        }
    }

    /// Single attempt with the key the rotator picks for this call.
    pub async fn complete_with_rotation(&self, prompt: &str) -> Result<String, GenerationError> {
        let (key_index, key) = self.rotator.select(&self.pool);

        match self.client.complete(&self.model, prompt, key).await {
            Ok(text) => {
                info!(key_index, model = %self.model, "Generation succeeded");
                Ok(text)
            }
            Err(e) => {
                warn!(key_index, model = %self.model, error = %e, "Generation failed");
                Err(GenerationError::Provider(e))
            }
        }
    }

    /// Tries each key in pool order and returns the first success.
    ///
    /// No delay between attempts and no classification of errors: any
    /// failure moves on to the next key.
    pub async fn complete_with_fallback(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut attempts = 0;

        for (key_index, key) in self.pool.iter() {
            attempts += 1;
            match self.client.complete(&self.model, prompt, key).await {
                Ok(text) => {
                    if attempts > 1 {
                        info!(
                            key_index,
                            attempt = attempts,
                            model = %self.model,
                            "Generation succeeded after fallback"
                        );
                    }
                    return Ok(text);
                }
                Err(e) => {
                    warn!(
                        key_index,
                        attempt = attempts,
                        model = %self.model,
                        error = %e,
                        "Credential failed, trying next"
                    );
                }
            }
        }

        warn!(attempts, model = %self.model, "All credentials failed");
        Err(GenerationError::AllProvidersExhausted { attempts })
    }
}
