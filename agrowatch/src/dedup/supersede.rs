//! Single-slot supersede mode.
//!
//! A [`SupersedingSlot`] serves one consumer (for example a map-move handler)
//! whose newest request always wins. Taking a new signal cancels the previous
//! one before the new request starts, so two generations never run together.

use std::future::Future;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{QueryError, QueryResult};

/// Cancellation handle for one generation of a slot.
#[derive(Debug, Clone)]
pub struct SlotSignal {
    generation: u64,
    token: CancellationToken,
}

impl SlotSignal {
    /// Generation number, increasing per slot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token to pass to the fetch core.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether this generation has been cancelled or superseded.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    current: Option<CancellationToken>,
}

/// A consumer slot in which each new request supersedes the last.
#[derive(Debug)]
pub struct SupersedingSlot {
    name: String,
    state: Mutex<SlotState>,
}

impl SupersedingSlot {
    /// Create a slot. The name only appears in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SlotState::default()),
        }
    }

    /// Cancel the previous generation and return a fresh signal.
    pub fn next_signal(&self) -> SlotSignal {
        let mut state = self.state.lock();
        if let Some(previous) = state.current.take() {
            previous.cancel();
            debug!(slot = %self.name, generation = state.generation, "Superseded request");
        }
        state.generation += 1;
        let token = CancellationToken::new();
        state.current = Some(token.clone());
        SlotSignal {
            generation: state.generation,
            token,
        }
    }

    /// Cancel the current generation, if any.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        if let Some(current) = state.current.take() {
            current.cancel();
            debug!(slot = %self.name, generation = state.generation, "Aborted request");
        }
    }

    /// Whether `signal` is still the live generation.
    pub fn is_current(&self, signal: &SlotSignal) -> bool {
        let state = self.state.lock();
        state.generation == signal.generation && !signal.token.is_cancelled()
    }

    /// Whether a generation is live.
    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Run `op` as the newest generation.
    ///
    /// The operation receives the generation's token. If the generation is
    /// superseded before `op` finishes, its result is discarded and the call
    /// settles as [`QueryError::Cancelled`].
    pub async fn run<F, Fut, T>(&self, op: F) -> QueryResult<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        let signal = self.next_signal();
        let result = op(signal.token.clone()).await;
        if self.is_current(&signal) {
            result
        } else {
            Err(QueryError::Cancelled)
        }
    }
}
