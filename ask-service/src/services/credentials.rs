//! Gemini API key pool and the counter-based rotation policy.
//!
//! Keys never leave this module in readable form except through
//! [`ApiKey::expose`], which only the HTTP client calls when building the
//! upstream request. Logs refer to keys by their pool index.

use secrecy::{ExposeSecret, Secret};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Number of consecutive selections routed to the same key.
pub const ROTATION_BATCH_SIZE: u64 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential pool is empty")]
    EmptyPool,

    #[error("credential #{0} is blank")]
    BlankKey(usize),
}

/// Opaque provider API key.
#[derive(Clone)]
pub struct ApiKey(Secret<String>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Secret::new(key.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Ordered, non-empty, read-only set of keys fixed at startup.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    keys: Vec<ApiKey>,
}

impl CredentialPool {
    pub fn new<I, S>(keys: I) -> Result<Self, CredentialError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = keys
            .into_iter()
            .enumerate()
            .map(|(idx, key)| {
                let key = key.into();
                if key.trim().is_empty() {
                    Err(CredentialError::BlankKey(idx))
                } else {
                    Ok(ApiKey::new(key))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if keys.is_empty() {
            return Err(CredentialError::EmptyPool);
        }

        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false for a constructed pool; present for API completeness.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ApiKey> {
        self.keys.get(index)
    }

    /// Keys in configured order, paired with their index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ApiKey)> {
        self.keys.iter().enumerate()
    }
}

/// Batch rotation over a [`CredentialPool`].
///
/// Selection `n` (0-based) uses key `(n / ROTATION_BATCH_SIZE) % len`, so
/// each key serves a contiguous run of calls before the next one takes over.
/// The counter is shared across requests and updated atomically.
#[derive(Debug, Default)]
pub struct CredentialRotator {
    counter: AtomicU64,
}

impl CredentialRotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the key to use for this call. Advances the counter.
    pub fn next_index(&self, pool_len: usize) -> usize {
        let call = self.counter.fetch_add(1, Ordering::Relaxed);
        index_for_call(call, pool_len)
    }

    /// Picks a key from `pool` and advances the counter.
    pub fn select<'a>(&self, pool: &'a CredentialPool) -> (usize, &'a ApiKey) {
        let index = self.next_index(pool.len());
        (index, &pool.keys[index])
    }

    /// Number of selections made so far.
    pub fn calls(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

fn index_for_call(call: u64, pool_len: usize) -> usize {
    debug_assert!(pool_len > 0);
    ((call / ROTATION_BATCH_SIZE) % pool_len as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pool(keys: &[&str]) -> CredentialPool {
        CredentialPool::new(keys.iter().copied()).unwrap()
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err = CredentialPool::new(Vec::<String>::new()).unwrap_err();
        assert_eq!(err, CredentialError::EmptyPool);
    }

    #[test]
    fn blank_key_is_rejected_with_position() {
        let err = CredentialPool::new(["key-a", "  "]).unwrap_err();
        assert_eq!(err, CredentialError::BlankKey(1));
    }

    #[test]
    fn debug_output_redacts_keys() {
        let pool = pool(&["super-secret-key"]);
        let rendered = format!("{:?}", pool);
        assert!(!rendered.contains("super-secret-key"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn batches_of_one_thousand_share_a_key() {
        let pool = pool(&["key-a", "key-b"]);
        let rotator = CredentialRotator::new();

        for _ in 0..ROTATION_BATCH_SIZE {
            let (idx, key) = rotator.select(&pool);
            assert_eq!(idx, 0);
            assert_eq!(key.expose(), "key-a");
        }
        for _ in 0..ROTATION_BATCH_SIZE {
            let (idx, key) = rotator.select(&pool);
            assert_eq!(idx, 1);
            assert_eq!(key.expose(), "key-b");
        }
        // Wraps around after the last key.
        assert_eq!(rotator.select(&pool).0, 0);
        assert_eq!(rotator.calls(), 2 * ROTATION_BATCH_SIZE + 1);
    }

    #[test]
    fn single_key_pool_always_selects_it() {
        let pool = pool(&["only"]);
        let rotator = CredentialRotator::new();
        for _ in 0..2500 {
            assert_eq!(rotator.select(&pool).0, 0);
        }
    }

    #[test]
    fn reset_starts_a_fresh_batch() {
        let pool = pool(&["key-a", "key-b"]);
        let rotator = CredentialRotator::new();
        for _ in 0..ROTATION_BATCH_SIZE {
            rotator.select(&pool);
        }
        assert_eq!(rotator.select(&pool).0, 1);

        rotator.reset();
        assert_eq!(rotator.calls(), 0);
        assert_eq!(rotator.select(&pool).0, 0);
    }

    #[test]
    fn index_formula_matches_batch_boundaries() {
        assert_eq!(index_for_call(999, 3), 0);
        assert_eq!(index_for_call(1000, 3), 1);
        assert_eq!(index_for_call(2999, 3), 2);
        assert_eq!(index_for_call(3000, 3), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_selection_loses_no_increments() {
        let pool = Arc::new(pool(&["key-a", "key-b"]));
        let rotator = Arc::new(CredentialRotator::new());

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let pool = pool.clone();
                let rotator = rotator.clone();
                tokio::spawn(async move {
                    for _ in 0..10 {
                        rotator.select(&pool);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(rotator.calls(), 2000);
    }
}
