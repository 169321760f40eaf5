//! Discovery configuration

use meshcoord_stack::DiscoveryRequest;
use serde::{Deserialize, Serialize};

use crate::backoff::RetryPolicy;

/// Discovery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Queue discovery automatically when a join signal arrives
    pub auto_discovery: bool,

    /// Manual discovery propagates failures instead of degrading
    pub strict_discovery: bool,

    /// Budget for one discovery round
    pub discover_timeout_ms: u64,

    /// Stack poll interval while waiting for descriptor responses
    pub discover_poll_ms: u64,

    /// Repeated join signals for an address inside this window are dropped
    pub join_debounce_ms: u64,

    pub retry: RetryPolicy,

    /// Maximum pending addresses; the oldest is dropped on overflow
    pub queue_max: usize,

    /// Ask for the power descriptor when the stack supports it
    pub include_power_desc: bool,

    /// Retry once without the power descriptor if a round fails
    pub fallback_without_power_desc: bool,

    /// Queue the stack's last-joined address on each tick
    pub last_joined_hint: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            auto_discovery: true,
            strict_discovery: false,
            discover_timeout_ms: 5_000,
            discover_poll_ms: 200,
            join_debounce_ms: 3_000,
            retry: RetryPolicy::discovery(),
            queue_max: 16,
            include_power_desc: true,
            fallback_without_power_desc: true,
            last_joined_hint: true,
        }
    }
}

impl DiscoveryConfig {
    /// Make the timing fields consistent
    ///
    /// The poll interval is at least 1 ms and the timeout leaves room for at
    /// least two polls. The queue holds at least one entry.
    pub fn normalize_timing(&mut self) {
        self.discover_poll_ms = self.discover_poll_ms.max(1);
        self.discover_timeout_ms = self
            .discover_timeout_ms
            .max(self.discover_poll_ms.saturating_mul(2));
        self.queue_max = self.queue_max.max(1);
    }

    /// Replace both timing fields, then normalize
    pub fn set_timing(&mut self, discover_timeout_ms: u64, discover_poll_ms: u64) {
        self.discover_timeout_ms = discover_timeout_ms;
        self.discover_poll_ms = discover_poll_ms;
        self.normalize_timing();
    }

    pub fn request(&self, include_power_desc: bool, strict: bool) -> DiscoveryRequest {
        DiscoveryRequest {
            include_power_desc,
            timeout_ms: self.discover_timeout_ms,
            poll_ms: self.discover_poll_ms,
            strict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_normalization() {
        let mut config = DiscoveryConfig {
            discover_timeout_ms: 1,
            discover_poll_ms: 1,
            ..Default::default()
        };
        config.normalize_timing();
        assert!(config.discover_poll_ms >= 1);
        assert!(config.discover_timeout_ms >= 2 * config.discover_poll_ms);

        config.set_timing(0, 0);
        assert_eq!(config.discover_poll_ms, 1);
        assert_eq!(config.discover_timeout_ms, 2);

        config.set_timing(100, 300);
        assert_eq!(config.discover_timeout_ms, 600);
    }

    #[test]
    fn test_defaults_already_normalized() {
        let mut config = DiscoveryConfig::default();
        let before = config.clone();
        config.normalize_timing();
        assert_eq!(config, before);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "join_debounce_ms: 500\nretry:\n  max_attempts: 5\n";
        let config: DiscoveryConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.join_debounce_ms, 500);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_ms, 400);
        assert_eq!(config.discover_timeout_ms, 5_000);
        assert!(config.auto_discovery);
    }
}
