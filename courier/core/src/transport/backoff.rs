//! Reconnect Backoff
//!
//! Delay policy for transport reconnection. Delays grow exponentially with
//! bounded jitter, never decrease between consecutive attempts, and cap at a
//! configured maximum. A successful connection resets the attempt counter;
//! exhausting the attempt budget is terminal until the caller reconnects
//! manually.

use std::time::Duration;

use rand::Rng;

/// Reconnection tuning
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectConfig {
    /// Whether to reconnect automatically after an unexpected close
    pub auto_reconnect: bool,
    /// Attempts allowed before giving up
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any computed delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
    /// Jitter as a fraction of the base delay, in `[0.0, 1.0]`
    pub jitter: f64,
}

impl ReconnectConfig {
    /// Default configuration: 5 attempts, 1s initial, 30s cap, factor 2.
    #[must_use]
    pub fn new() -> Self {
        Self {
            auto_reconnect: true,
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: 0.25,
        }
    }

    /// Configuration with automatic reconnection turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            auto_reconnect: false,
            ..Self::new()
        }
    }

    /// Set the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the first-retry delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the per-attempt multiplier.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the jitter fraction.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Fast timings for tests (millisecond delays).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            auto_reconnect: true,
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
            backoff_factor: 2.0,
            jitter: 0.0,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateful reconnect scheduler
///
/// Owned by the connection driver. `next_delay` consumes one attempt from
/// the budget; `reset` returns the budget after a successful open.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
    last_delay: Duration,
}

impl ReconnectPolicy {
    /// Create a policy from configuration.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt: 0,
            last_delay: Duration::ZERO,
        }
    }

    /// Attempts consumed since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the attempt budget is spent (or reconnection is off).
    #[must_use]
    pub fn exhausted(&self) -> bool {
        !self.config.auto_reconnect || self.attempt >= self.config.max_attempts
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_delay = Duration::ZERO;
    }

    /// Compute the delay before the next attempt and consume it from the
    /// budget. Returns `None` when reconnection is disabled or the budget is
    /// exhausted.
    ///
    /// The delay is `min(initial * factor^attempt + jitter, max)`, further
    /// clamped to never fall below the previous delay so the sequence is
    /// non-decreasing until it reaches the cap.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }

        let initial_ms = duration_as_ms(self.config.initial_delay);
        let max_ms = duration_as_ms(self.config.max_delay);
        #[allow(clippy::cast_possible_wrap)]
        let base_ms = initial_ms * self.config.backoff_factor.powi(self.attempt as i32);
        let jitter_ms = if self.config.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.config.jitter.min(1.0)) * base_ms
        } else {
            0.0
        };

        let last_ms = duration_as_ms(self.last_delay);
        let delay_ms = (base_ms + jitter_ms).max(last_ms).min(max_ms);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms.round() as u64);
        self.attempt += 1;
        self.last_delay = delay;
        Some(delay)
    }
}

#[allow(clippy::cast_precision_loss)]
fn duration_as_ms(duration: Duration) -> f64 {
    duration.as_millis() as f64
}
