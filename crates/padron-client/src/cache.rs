//! Shared key-value cache collaborator.
//!
//! The lookup stack caches two things: the WSAA trust ticket and finished
//! enrichment results. Both go through [`CacheStore`], constructed once at
//! process start and shared by `Arc`. A failing store never fails a lookup:
//! callers log the error and carry on as if the key were missing.
//!
//! [`InMemoryCache`] is a process-local implementation on `DashMap` with
//! per-entry expiry, suitable for single-instance deployments and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// Cache backend failure.
#[derive(Debug, thiserror::Error)]
#[error("cache backend error: {0}")]
pub struct CacheError(pub String);

/// Get / set-with-TTL key-value store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live value.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value for `ttl`. Returns whether the write was accepted.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;
}

/// Read through a cache, degrading any backend error to a miss.
pub(crate) async fn get_or_miss(cache: &dyn CacheStore, key: &str) -> Option<String> {
    match cache.get(key).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, "cache read failed, treating as miss: {e}");
            None
        }
    }
}

/// Write to a cache, logging (never propagating) backend errors.
pub(crate) async fn set_or_log(cache: &dyn CacheStore, key: &str, value: &str, ttl: Duration) {
    match cache.set(key, value, ttl).await {
        Ok(true) => tracing::debug!(key, ttl_secs = ttl.as_secs(), "cache write"),
        Ok(false) => tracing::warn!(key, "cache rejected write"),
        Err(e) => tracing::warn!(key, "cache write failed: {e}"),
    }
}

/// Writes between sweeps of expired entries.
const SWEEP_EVERY: u64 = 64;

/// In-process cache with per-entry expiry.
///
/// Expired entries are dropped on read and by a periodic sweep on write, so
/// keys that are never read again do not accumulate.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (String, Instant)>,
    writes: AtomicU64,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(&self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires)| *expires > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::trace!(removed, "swept expired cache entries");
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .and_then(|entry| (entry.1 > now).then(|| entry.0.clone()));
        if live.is_none() {
            self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
        }
        Ok(live)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        if ttl.is_zero() {
            return Ok(false);
        }
        let now = Instant::now();
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now);
        }
        self.entries
            .insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }
}
