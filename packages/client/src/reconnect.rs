//! Reconnect policy.
//!
//! Pure functions deciding whether and when the next connection attempt happens.

use std::time::Duration;

use crate::config::ConnectionConfig;

/// Exponential backoff bounded by a maximum number of attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_factor: f64,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_factor,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(
            config.max_attempts(),
            config.initial_delay(),
            config.backoff_factor(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Check if reconnect attempt `attempt` (1-based) is allowed.
    pub fn should_attempt_reconnect(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before reconnect attempt `attempt` (1-based):
    /// `initial_delay * backoff_factor^(attempt - 1)`.
    ///
    /// # Returns
    ///
    /// `None` once the attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.should_attempt_reconnect(attempt) {
            return None;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let seconds = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Some(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
    }

    /// All delays of a full reconnect cycle, in order.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).filter_map(|attempt| self.delay_for(attempt))
    }
}
