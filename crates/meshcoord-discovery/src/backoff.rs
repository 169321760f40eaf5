//! Bounded retry policy shared by discovery and self-heal

use serde::{Deserialize, Serialize};

/// Capped exponential backoff without jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay after the first failure
    pub base_ms: u64,

    /// Upper bound for any single delay
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_ms: u64, max_backoff_ms: u64) -> Self {
        RetryPolicy {
            max_attempts,
            base_ms,
            max_backoff_ms,
        }
    }

    /// Defaults for per-address descriptor discovery
    pub fn discovery() -> Self {
        Self::new(3, 400, 5_000)
    }

    /// Defaults for network self-heal
    pub fn self_heal() -> Self {
        Self::new(2, 100, 2_000)
    }

    /// Another attempt is allowed after `failures` failed attempts
    ///
    /// The first attempt always runs, even with `max_attempts == 0`.
    pub fn can_retry(&self, failures: u32) -> bool {
        failures.saturating_add(1) < self.max_attempts
    }

    /// Delay before the retry that follows `failures` earlier failures
    ///
    /// `min(max_backoff_ms, base_ms * 2^failures)`; never decreases as
    /// `failures` grows.
    pub fn delay_for(&self, failures: u32) -> u64 {
        let factor = 1u64.checked_shl(failures).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.max_backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::discovery()
    }
}
