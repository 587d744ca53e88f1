use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

use crate::services::credentials::CredentialPool;
use crate::services::generator::KeyStrategy;
use crate::services::identity::DEFAULT_JWKS_URL;
use crate::services::providers::gemini::DEFAULT_API_BASE;

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_ALLOWED_ORIGIN: &str = "https://api-testengine.netlify.app";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AskConfig {
    pub common: core_config::Config,
    pub environment: String,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub firebase: FirebaseConfig,
    pub gemini: GeminiSettings,
    pub upstream_timeout: Duration,
    pub allowed_origin: String,
}

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub client_email: Option<String>,
    pub jwks_url: String,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub model: String,
    pub api_base: String,
    pub keys: CredentialPool,
    pub strategy: KeyStrategy,
}

/// Subset of a Google service-account JSON file.
#[derive(Debug, Deserialize)]
struct ServiceAccount {
    project_id: Option<String>,
    client_email: Option<String>,
}

impl AskConfig {
    pub fn load() -> Result<Self, AppError> {
        let mut common = core_config::Config::load()?;
        let source = EnvSource::new(|key| env::var(key).ok());

        if let Some(port) = source.optional("AI_PORT") {
            common.port = port.parse().map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!("AI_PORT must be a port number"))
            })?;
        }

        Self::from_source(common, &source)
    }

    fn from_source<F>(common: core_config::Config, source: &EnvSource<F>) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let firebase_json = source.get("FIREBASE_JSON", None)?;
        let account = decode_service_account(&firebase_json)?;
        let project_id = account.project_id.filter(|p| !p.is_empty()).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("FIREBASE_JSON has no project_id"))
        })?;

        let strategy = source
            .get("GEMINI_KEY_STRATEGY", Some(KeyStrategy::default().as_str()))?
            .parse::<KeyStrategy>()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let timeout_secs = source
            .get(
                "UPSTREAM_TIMEOUT_SECS",
                Some(&DEFAULT_UPSTREAM_TIMEOUT_SECS.to_string()),
            )?
            .parse::<u64>()
            .map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!(
                    "UPSTREAM_TIMEOUT_SECS must be a whole number of seconds"
                ))
            })?;

        Ok(AskConfig {
            common,
            environment: source.environment().to_string(),
            service_name: source.get("SERVICE_NAME", Some("ask-service"))?,
            log_level: source.get("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: source.optional("OTLP_ENDPOINT"),
            firebase: FirebaseConfig {
                project_id,
                client_email: account.client_email,
                jwks_url: source.get("FIREBASE_JWKS_URL", Some(DEFAULT_JWKS_URL))?,
            },
            gemini: GeminiSettings {
                model: source.get("GEMINI_MODEL", Some(DEFAULT_MODEL))?,
                api_base: source.get("GEMINI_API_BASE", Some(DEFAULT_API_BASE))?,
                keys: collect_api_keys(source)?,
                strategy,
            },
            upstream_timeout: Duration::from_secs(timeout_secs),
            allowed_origin: source.get("ALLOWED_ORIGIN", Some(DEFAULT_ALLOWED_ORIGIN))?,
        })
    }

    pub fn is_prod(&self) -> bool {
        self.environment == "prod"
    }
}

fn decode_service_account(encoded: &str) -> Result<ServiceAccount, AppError> {
    let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("FIREBASE_JSON is not valid base64: {}", e))
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(
            "FIREBASE_JSON is not a service account JSON: {}",
            e
        ))
    })
}

/// Numbered `GEMINI_API_KEY_1..N` (stopping at the first gap), then any
/// comma-separated `GEMINI_API_KEYS`.
fn collect_api_keys<F>(source: &EnvSource<F>) -> Result<CredentialPool, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut keys: Vec<String> = (1..)
        .map(|n| source.optional(&format!("GEMINI_API_KEY_{}", n)))
        .take_while(Option::is_some)
        .flatten()
        .collect();

    if let Some(list) = source.optional("GEMINI_API_KEYS") {
        keys.extend(
            list.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
        );
    }

    CredentialPool::new(keys).map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(
            "Gemini API keys: {} (set GEMINI_API_KEY_1 or GEMINI_API_KEYS)",
            e
        ))
    })
}

/// Environment lookup with production strictness.
struct EnvSource<F> {
    lookup: F,
    environment: String,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "dev".to_string());
        Self {
            lookup,
            environment,
        }
    }

    fn environment(&self) -> &str {
        &self.environment
    }

    fn is_prod(&self) -> bool {
        self.environment == "prod"
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn get(&self, key: &str, default: Option<&str>) -> Result<String, AppError> {
        match self.optional(key) {
            Some(val) => Ok(val),
            None => {
                if self.is_prod() {
                    Err(AppError::ConfigError(anyhow::anyhow!(
                        "{} is required in production but not set",
                        key
                    )))
                } else if let Some(def) = default {
                    Ok(def.to_string())
                } else {
                    Err(AppError::ConfigError(anyhow::anyhow!(
                        "{} is required but not set",
                        key
                    )))
                }
            }
        }
    }
}
