//! Reconnect backoff policy.
//!
//! delay(n) = min(base * multiplier^(n-1), cap) for attempt n >= 1. One
//! policy instance lives for the duration of one reconnect loop; success or
//! manual disconnect drops it, resetting the attempt counter.

use std::time::Duration;

use contracts::ReconnectConfig;

#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Advance to the next attempt and return its delay.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        Duration::from_millis(self.delay_for(self.attempt))
    }

    /// Attempts consumed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn delay_for(&self, attempt: u32) -> u64 {
        let exp = self.config.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.config.base_delay_ms as f64 * exp;
        (delay as u64).min(self.config.max_delay_ms)
    }
}
