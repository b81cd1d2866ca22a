//! Reconnection backoff.
//!
//! Reconnection policy belongs to the transport; an operation is never
//! re-routed after its transport drops and reconnects.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::{DEFAULT_RECONNECT_DELAY, MAX_RECONNECT_DELAY, StreamError, StreamResult};

/// Reconnection configuration.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts, `None` for unlimited.
    pub max_attempts: Option<u32>,
    /// Initial delay before the first reconnection.
    pub initial_delay: Duration,
    /// Maximum delay between reconnections.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Whether to add jitter.
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            initial_delay: DEFAULT_RECONNECT_DELAY,
            max_delay: MAX_RECONNECT_DELAY,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnection configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Calculate the delay for a given attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_possible_wrap)]
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter {
            // 0.5x to 1.5x spread.
            capped * (0.5 + rand::random::<f64>())
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }
}

/// Per-connection reconnection state.
#[derive(Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectState {
    /// Create fresh state for a connection.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Reset after a successful reconnection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Current attempt count.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another reconnection attempt is allowed.
    #[must_use]
    pub fn can_reconnect(&self) -> bool {
        self.config
            .max_attempts
            .is_none_or(|max| self.attempts < max)
    }

    /// Wait out the backoff before the next attempt.
    pub async fn wait(&mut self) -> StreamResult<()> {
        if !self.can_reconnect() {
            return Err(StreamError::ReconnectLimitExceeded {
                attempts: self.attempts,
            });
        }

        let delay = self.config.delay_for_attempt(self.attempts);
        debug!(
            attempt = self.attempts,
            delay_ms = delay.as_millis(),
            "waiting before reconnection"
        );
        sleep(delay).await;
        self.attempts += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, Some(10));
        assert_eq!(config.initial_delay, DEFAULT_RECONNECT_DELAY);
        assert!(config.jitter);
    }

    #[test]
    fn delay_doubles_without_jitter() {
        let config = ReconnectConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(60))
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        // Capped at the maximum.
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(60));
    }

    #[test]
    fn attempt_limit_is_enforced() {
        let mut state = ReconnectState::new(ReconnectConfig::new().with_max_attempts(3));
        assert!(state.can_reconnect());
        state.attempts = 3;
        assert!(!state.can_reconnect());
        state.reset();
        assert_eq!(state.attempts(), 0);
    }

    #[tokio::test]
    async fn wait_past_limit_fails() {
        let mut state = ReconnectState::new(
            ReconnectConfig::new()
                .with_max_attempts(1)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        );
        state.wait().await.expect("first wait");
        let err = state.wait().await.expect_err("limit");
        assert!(matches!(err, StreamError::ReconnectLimitExceeded { attempts: 1 }));
    }
}
