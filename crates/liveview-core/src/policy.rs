//! Bounded exponential backoff for automatic reconnects.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconnect attempt counter plus its backoff parameters.
///
/// `delay(n) = base_delay × 2^(n−1)` for attempt `n` in `1..=max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    #[serde(alias = "baseDelayMs")]
    pub base_delay_ms: u64,
    #[serde(alias = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(skip)]
    attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 1_000, max_attempts: 5, attempts: 0 }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay_ms: u64, max_attempts: u32) -> Self {
        Self { base_delay_ms, max_attempts, attempts: 0 }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Consume one attempt. Returns the attempt number and the delay before it
    /// fires, or `None` once the budget is spent.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.exhausted() {
            return None;
        }
        self.attempts += 1;
        Some((self.attempts, self.delay_for(self.attempts)))
    }

    /// Backoff for attempt `n` (1-based). Saturates instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}
