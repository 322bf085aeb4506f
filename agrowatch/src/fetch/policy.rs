//! Retry policy for the fetch core.
//!
//! One policy covers both backoff shapes found in practice: exponential
//! (`base * multiplier^attempt`) and fixed delay, which is the same formula
//! with a multiplier of 1.
//!
//! # Example
//!
//! ```ignore
//! use agrowatch::fetch::RetryPolicy;
//! use std::time::Duration;
//!
//! // 3 retries, 3s base delay, doubling each time
//! let policy = RetryPolicy::exponential(3, Duration::from_secs(3));
//!
//! // 3 retries, always 3s apart
//! let fixed = RetryPolicy::fixed(3, Duration::from_secs(3));
//! ```

use std::time::Duration;

// =============================================================================
// Retry Policy Constants
// =============================================================================

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between attempts (3 seconds).
pub const DEFAULT_RETRY_DELAY_MS: u64 = 3000;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default maximum delay for exponential backoff (60 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 60;

/// How the fetch core retries retry-eligible failures.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. Total attempts is `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor per retry. Values below 1.0 are treated as 1.0.
    pub multiplier: f64,
    /// Cap applied to every computed delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Exponential backoff with the default multiplier and cap.
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
        }
    }

    /// Constant delay between attempts.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// Set the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Total number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculates the delay before retry number `attempt`.
    ///
    /// # Arguments
    ///
    /// * `attempt` - Zero-based retry index (0 is the first retry)
    ///
    /// # Returns
    ///
    /// The delay to wait, or `None` if no more retries are allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }

        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        let factor = multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let cap_ms = self.max_delay.as_millis() as f64;
        let delay_ms = (self.base_delay.as_millis() as f64 * factor).min(cap_ms);

        Some(Duration::from_millis(delay_ms as u64))
    }

    /// Worst-case latency of one logical call with the given attempt timeout.
    ///
    /// This is `sum_over_attempts(timeout + delay)`, ignoring server-supplied
    /// `Retry-After` values.
    pub fn worst_case_latency(&self, timeout: Duration) -> Duration {
        let delays: Duration = (0..self.max_retries)
            .filter_map(|attempt| self.delay_for_attempt(attempt))
            .sum();
        timeout * self.max_attempts() + delays
    }
}
