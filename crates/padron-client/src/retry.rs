//! Retry policy with exponential backoff and jitter for lookup attempts.
//!
//! The orchestrator makes up to `max_attempts` attempts. Between attempt
//! `n` (0-indexed) and `n + 1` it waits `base_delay * 2^n` plus a uniform
//! jitter in `0..=max_jitter`. With the defaults that is ~250-350ms, then
//! ~500-600ms.
//!
//! The wait itself goes through the [`Backoff`] trait so tests can observe
//! delays without sleeping.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Attempt budget and delay shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later one.
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay after the 0-indexed `attempt`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Full delay after `attempt`, with random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.base_delay_for(attempt) + jitter
    }
}

/// Waits between attempts.
#[async_trait]
pub trait Backoff: Send + Sync {
    /// Pause for `delay`.
    async fn pause(&self, delay: Duration);
}

/// [`Backoff`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioBackoff;

#[async_trait]
impl Backoff for TokioBackoff {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
