//! Stale-response guard.
//!
//! Each named stream keeps a monotonically increasing counter. A caller takes
//! a [`RequestToken`] before starting async work and checks
//! [`StaleGuard::is_current`] after every await, before applying results or
//! clearing loading state. Only the most recently issued request of a stream
//! may mutate shared state.

use dashmap::DashMap;
use tracing::debug;

/// Counter value captured when a request was issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestToken {
    stream: String,
    value: u64,
}

impl RequestToken {
    /// Stream the token belongs to.
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Captured counter value.
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Per-stream request counters.
#[derive(Debug, Default)]
pub struct StaleGuard {
    counters: DashMap<String, u64>,
}

impl StaleGuard {
    /// Create a guard with no streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new request on `stream`, invalidating all earlier tokens.
    pub fn begin(&self, stream: &str) -> RequestToken {
        let mut counter = self.counters.entry(stream.to_string()).or_insert(0);
        *counter += 1;
        RequestToken {
            stream: stream.to_string(),
            value: *counter,
        }
    }

    /// Whether `token` is still the latest request on its stream.
    pub fn is_current(&self, token: &RequestToken) -> bool {
        let current = self.current(&token.stream);
        let is_current = current == Some(token.value);
        if !is_current {
            debug!(
                stream = %token.stream,
                token = token.value,
                current = ?current,
                "Discarding stale response"
            );
        }
        is_current
    }

    /// Latest counter value for `stream`, if any request was issued.
    pub fn current(&self, stream: &str) -> Option<u64> {
        self.counters.get(stream).map(|c| *c)
    }
}
