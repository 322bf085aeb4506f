//! Throttle: invoke at most once per interval, dropping the rest.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Invokes an action immediately, then suppresses calls until `min_interval`
/// has elapsed since the last accepted call.
///
/// Suppressed calls are dropped, never queued.
pub struct Throttle<A> {
    min_interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
    action: Box<dyn Fn(A) + Send + Sync>,
}

impl<A> Throttle<A> {
    /// Create a throttle around `action`.
    pub fn new<F>(min_interval: Duration, action: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            min_interval,
            last_accepted: Mutex::new(None),
            action: Box::new(action),
        }
    }

    /// Configured minimum interval.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Invoke the action if the interval has elapsed.
    ///
    /// Returns whether the call was accepted.
    pub fn call(&self, args: A) -> bool {
        let now = Instant::now();
        {
            let mut last = self.last_accepted.lock();
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.min_interval {
                    return false;
                }
            }
            *last = Some(now);
        }
        (self.action)(args);
        true
    }

    /// Forget the last accepted call so the next one goes through.
    pub fn reset(&self) {
        *self.last_accepted.lock() = None;
    }
}
