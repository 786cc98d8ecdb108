//! Dial retry policy.
//!
//! `connect` retries failed dials at `reconnect_ivl`. The interval stays fixed
//! unless `reconnect_ivl_max` is set, in which case it doubles per failure up to
//! that cap (libzmq semantics). `connect_attempts` bounds the number of dials.

use crate::options::SocketOptions;
use std::time::Duration;

/// Retry state tracker for one `connect` call.
///
/// # Example
///
/// ```rust
/// use keel_core::reconnect::RetryState;
/// use keel_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let options = SocketOptions::default()
///     .with_reconnect_ivl(Duration::from_millis(100))
///     .with_reconnect_ivl_max(Duration::from_secs(10));
///
/// let mut retry = RetryState::new(&options);
///
/// // First retry uses base interval
/// assert_eq!(retry.next_delay(), Duration::from_millis(100));
///
/// // Subsequent retries use exponential backoff
/// assert_eq!(retry.next_delay(), Duration::from_millis(200));
/// assert_eq!(retry.next_delay(), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Base retry interval
    base_interval: Duration,
    /// Maximum retry interval (`ZERO` = fixed interval)
    max_interval: Duration,
    /// Maximum number of failed attempts before giving up
    max_attempts: Option<u32>,
    /// Failed attempts so far
    attempt: u32,
    /// Delay returned by the next `next_delay` call
    current_interval: Duration,
}

impl RetryState {
    /// Create a new retry tracker from socket options.
    pub const fn new(options: &SocketOptions) -> Self {
        Self {
            base_interval: options.reconnect_ivl,
            max_interval: options.reconnect_ivl_max,
            max_attempts: options.connect_attempts,
            attempt: 0,
            current_interval: options.reconnect_ivl,
        }
    }

    /// Record a failed attempt and return the delay before the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_interval;
        self.attempt = self.attempt.saturating_add(1);

        if !self.max_interval.is_zero() {
            self.current_interval = self
                .base_interval
                .saturating_mul(1_u32 << self.attempt.min(10))
                .min(self.max_interval);
        }

        delay
    }

    /// True once the attempt budget is spent.
    #[inline]
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.max_attempts.is_some_and(|max| self.attempt >= max)
    }

    /// Number of failed attempts recorded.
    #[inline]
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
