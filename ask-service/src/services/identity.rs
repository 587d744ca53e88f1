//! Firebase ID token verification.
//!
//! Tokens are RS256 JWTs signed by Google. The public keys are published as a
//! JWK set and rotated regularly; the set is cached for as long as the
//! response's `Cache-Control: max-age` allows. A token naming a `kid` the
//! cache does not know triggers a refetch, at most once per
//! `min_refresh_interval`; concurrent refreshes share a single fetch.

use crate::models::{FirebaseClaims, VerifiedIdentity};
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Google's JWK endpoint for Firebase ID token signing keys.
pub const DEFAULT_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);
const CLOCK_SKEW_SECS: i64 = 60;

/// Shortest gap between two fetches triggered by unknown `kid`s.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("No signing key matches kid '{0}'")]
    UnknownKey(String),

    #[error("Token rejected: {0}")]
    Invalid(String),

    #[error("Signing keys unavailable: {0}")]
    KeyFetch(String),
}

/// Verifies bearer tokens presented by callers.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;

    /// Succeeds when the verifier is able to verify tokens right now.
    async fn health_check(&self) -> Result<(), IdentityError>;
}

#[derive(Debug, Clone)]
pub struct FirebaseVerifierConfig {
    pub project_id: String,
    pub jwks_url: String,
    pub timeout: Duration,
    pub min_refresh_interval: Duration,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
    expires_at: Instant,
}

impl CachedKeys {
    /// Usable keys, unless stale or due for a forced refresh.
    fn usable(
        &self,
        now: Instant,
        force_refresh: bool,
        min_refresh_interval: Duration,
    ) -> Option<&JwkSet> {
        if self.expires_at <= now {
            return None;
        }
        if force_refresh && now.duration_since(self.fetched_at) >= min_refresh_interval {
            return None;
        }
        Some(&self.keys)
    }
}

pub struct FirebaseVerifier {
    config: FirebaseVerifierConfig,
    client: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
    refresh: Mutex<()>,
}

impl FirebaseVerifier {
    pub fn new(config: FirebaseVerifierConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IdentityError::KeyFetch(e.to_string()))?;

        Ok(Self {
            config,
            client,
            cache: RwLock::new(None),
            refresh: Mutex::new(()),
        })
    }

    pub fn issuer(&self) -> String {
        format!("{}{}", ISSUER_PREFIX, self.config.project_id)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.config.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "aud", "iss"]);
        validation.leeway = CLOCK_SKEW_SECS as u64;
        validation
    }

    /// Current key set, fetching it when the cache is empty or stale, or when
    /// `force_refresh` is set and the last fetch is old enough.
    async fn signing_keys(&self, force_refresh: bool) -> Result<JwkSet, IdentityError> {
        if let Some(keys) = self.cached_keys(force_refresh).await {
            return Ok(keys);
        }

        // One fetch at a time; waiters reuse its result.
        let _refresh = self.refresh.lock().await;
        if let Some(keys) = self.cached_keys(force_refresh).await {
            return Ok(keys);
        }

        let fresh = self.fetch_keys().await?;
        let keys = fresh.keys.clone();
        *self.cache.write().await = Some(fresh);
        Ok(keys)
    }

    async fn cached_keys(&self, force_refresh: bool) -> Option<JwkSet> {
        let cache = self.cache.read().await;
        cache
            .as_ref()?
            .usable(Instant::now(), force_refresh, self.config.min_refresh_interval)
            .cloned()
    }

    async fn fetch_keys(&self) -> Result<CachedKeys, IdentityError> {
        let response = self
            .client
            .get(&self.config.jwks_url)
            .send()
            .await
            .map_err(|e| IdentityError::KeyFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IdentityError::KeyFetch(format!(
                "JWK endpoint returned {}",
                response.status()
            )));
        }

        let ttl = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_KEY_TTL);

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| IdentityError::KeyFetch(e.to_string()))?;

        tracing::debug!(
            key_count = keys.keys.len(),
            ttl_secs = ttl.as_secs(),
            "Fetched Firebase signing keys"
        );

        let fetched_at = Instant::now();
        Ok(CachedKeys {
            keys,
            fetched_at,
            expires_at: fetched_at + ttl,
        })
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, IdentityError> {
        let mut keys = self.signing_keys(false).await?;
        if keys.find(kid).is_none() {
            keys = self.signing_keys(true).await?;
        }

        let jwk = keys
            .find(kid)
            .ok_or_else(|| IdentityError::UnknownKey(kid.to_string()))?;

        DecodingKey::from_jwk(jwk).map_err(|e| IdentityError::Invalid(e.to_string()))
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let header = decode_header(token).map_err(|e| IdentityError::Malformed(e.to_string()))?;

        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::Invalid(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| IdentityError::Malformed("missing kid".to_string()))?;

        let key = self.decoding_key(&kid).await?;

        let claims = decode::<FirebaseClaims>(token, &key, &self.validation())
            .map_err(|e| IdentityError::Invalid(e.to_string()))?
            .claims;

        check_subject_and_times(&claims, chrono::Utc::now().timestamp())?;

        Ok(claims.into())
    }

    async fn health_check(&self) -> Result<(), IdentityError> {
        self.signing_keys(false).await.map(|_| ())
    }
}

fn check_subject_and_times(claims: &FirebaseClaims, now: i64) -> Result<(), IdentityError> {
    if claims.sub.trim().is_empty() {
        return Err(IdentityError::Invalid("empty subject".to_string()));
    }
    if claims.iat > now + CLOCK_SKEW_SECS {
        return Err(IdentityError::Invalid("issued in the future".to_string()));
    }
    if matches!(claims.auth_time, Some(t) if t > now + CLOCK_SKEW_SECS) {
        return Err(IdentityError::Invalid(
            "authenticated in the future".to_string(),
        ));
    }
    Ok(())
}

fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// In-memory verifier that accepts a fixed set of tokens.
#[derive(Default)]
pub struct MockVerifier {
    tokens: HashMap<String, VerifiedIdentity>,
    unavailable: bool,
    calls: AtomicUsize,
}

impl MockVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepting(mut self, token: impl Into<String>, identity: VerifiedIdentity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Makes `health_check` fail.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Number of `verify` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for MockVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::Invalid("unknown token".to_string()))
    }

    async fn health_check(&self) -> Result<(), IdentityError> {
        if self.unavailable {
            Err(IdentityError::KeyFetch("mock verifier unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}
