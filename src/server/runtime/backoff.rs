//! Back-off configuration for the TCP accept and UDP receive loops.

use std::time::Duration;

/// Configuration for exponential back-off timing in the listener loops.
///
/// Controls retry behaviour when `accept()` on the TCP listener or
/// `recv_from()` on the UDP socket fails. The back-off starts at
/// `initial_delay` and doubles on each consecutive failure, capped at
/// `max_delay`. A successful accept resets it.
///
/// # Default Values
/// - `initial_delay`: 10 milliseconds
/// - `max_delay`: 1 second
///
/// # Invariants
/// - `initial_delay` must not exceed `max_delay`
/// - `initial_delay` must be at least 1 millisecond
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay used for the first retry after a failed accept.
    pub initial_delay: Duration,
    /// Maximum back-off delay once retries have increased exponentially.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Clamp delays to sane bounds and ensure `initial_delay <= max_delay`.
    ///
    /// This prevents accidental misconfiguration (for example, inverted or
    /// zero durations) before the values are used in the accept loop.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use sessionframe::server::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::from_millis(1),
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay to wait after a failure that followed a wait of `current`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration { (current * 2).min(self.max_delay) }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(5, 10)]
    #[case(600, 1000)]
    #[case(1000, 1000)]
    fn delay_doubles_up_to_max(#[case] current_ms: u64, #[case] expected_ms: u64) {
        let cfg = BackoffConfig::default();
        assert_eq!(
            cfg.next_delay(Duration::from_millis(current_ms)),
            Duration::from_millis(expected_ms)
        );
    }

    #[test]
    fn zero_delays_are_clamped() {
        let cfg = BackoffConfig {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
        .normalized();
        assert_eq!(cfg.initial_delay, Duration::from_millis(1));
        assert_eq!(cfg.max_delay, Duration::from_millis(1));
    }
}
