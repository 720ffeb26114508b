//! Reconnect backoff configuration and delay calculation.
//!
//! The delay before reconnect attempt `n` (1-indexed) is
//! `base_delay * 2^(n-1)`. There is no cap and no jitter: the attempt count
//! is bounded by [`ReconnectConfig::max_attempts`] instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum number of reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Reconnect policy parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    /// Attempts allowed after an unexpected disconnect (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first attempt in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl ReconnectConfig {
    /// Base delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay before the given 1-indexed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        reconnect_delay(attempt, self.base_delay())
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`.
///
/// `attempt` is 1-indexed; 0 is treated as 1. Saturates instead of
/// overflowing for absurd attempt numbers.
pub fn reconnect_delay(attempt: u32, base: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 1000);
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let config: ReconnectConfig = serde_json::from_str(r#"{"maxAttempts":3}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 1000);
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_value(ReconnectConfig::default()).unwrap();
        assert_eq!(json["maxAttempts"], 5);
        assert_eq!(json["baseDelayMs"], 1000);
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let base = Duration::from_secs(1);
        assert_eq!(reconnect_delay(1, base), Duration::from_secs(1));
        assert_eq!(reconnect_delay(2, base), Duration::from_secs(2));
        assert_eq!(reconnect_delay(3, base), Duration::from_secs(4));
        assert_eq!(reconnect_delay(4, base), Duration::from_secs(8));
        assert_eq!(reconnect_delay(5, base), Duration::from_secs(16));
    }

    #[test]
    fn attempt_zero_uses_base() {
        assert_eq!(reconnect_delay(0, Duration::from_millis(250)), Duration::from_millis(250));
    }

    #[test]
    fn huge_attempt_does_not_panic() {
        let delay = reconnect_delay(u32::MAX, Duration::from_secs(1));
        assert!(delay >= Duration::from_secs(1 << 30));
    }

    #[test]
    fn delay_for_uses_config_base() {
        let config = ReconnectConfig {
            max_attempts: 3,
            base_delay_ms: 100,
        };
        assert_eq!(config.delay_for(3), Duration::from_millis(400));
    }

    proptest! {
        #[test]
        fn delay_matches_formula(attempt in 1u32..20, base_ms in 1u64..10_000) {
            let base = Duration::from_millis(base_ms);
            let expected = Duration::from_millis(base_ms * (1u64 << (attempt - 1)));
            prop_assert_eq!(reconnect_delay(attempt, base), expected);
        }

        #[test]
        fn delay_is_monotonic(attempt in 1u32..40) {
            let base = Duration::from_millis(10);
            prop_assert!(reconnect_delay(attempt + 1, base) >= reconnect_delay(attempt, base));
        }
    }
}
