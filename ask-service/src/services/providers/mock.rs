//! Mock completion client for testing.

use super::{CompletionClient, ProviderError};
use crate::services::credentials::ApiKey;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// One recorded call to [`MockCompletionClient::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub model: String,
    pub prompt: String,
    pub key: String,
}

/// Completion client with scripted outcomes per key.
///
/// Keys without a scripted outcome get the default outcome.
pub struct MockCompletionClient {
    default_outcome: Result<String, ProviderError>,
    per_key: HashMap<String, Result<String, ProviderError>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockCompletionClient {
    pub fn succeeding(text: impl Into<String>) -> Self {
        Self::with_default(Ok(text.into()))
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::with_default(Err(error))
    }

    fn with_default(default_outcome: Result<String, ProviderError>) -> Self {
        Self {
            default_outcome,
            per_key: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_key_outcome(
        mut self,
        key: impl Into<String>,
        outcome: Result<String, ProviderError>,
    ) -> Self {
        self.per_key.insert(key.into(), outcome);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Keys used, in call order.
    pub fn keys_used(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.key).collect()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        credential: &ApiKey,
    ) -> Result<String, ProviderError> {
        let key = credential.expose().to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                model: model.to_string(),
                prompt: prompt.to_string(),
                key: key.clone(),
            });
        }

        self.per_key
            .get(&key)
            .unwrap_or(&self.default_outcome)
            .clone()
    }
}
