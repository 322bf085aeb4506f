//! Debounce: collapse a burst of calls into one, after the burst ends.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::fetch::BoxFuture;

type Action<A> = Arc<dyn Fn(A) -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs an action `delay` after the last call in a burst.
///
/// Each call resets the pending timer and replaces the pending arguments, so
/// the action sees the arguments of the last call. Once the timer fires the
/// action runs on its own task; a later call does not interrupt it.
pub struct Debouncer<A> {
    delay: Duration,
    action: Action<A>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<A> Debouncer<A>
where
    A: Send + 'static,
{
    /// Create a debouncer around an async action.
    pub fn new<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            delay,
            action: Arc::new(move |args| -> BoxFuture<'static, ()> { Box::pin(action(args)) }),
            pending: Mutex::new(None),
        }
    }

    /// Configured quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule the action with `args`, replacing any pending call.
    ///
    /// Must be called from within a tokio runtime.
    pub fn call(&self, args: A) {
        let action = Arc::clone(&self.action);
        let delay = self.delay;

        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
            trace!("Debounce timer reset");
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action(args));
        }));
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self.pending.lock().take() {
            previous.abort();
        }
    }

    /// Whether a call is waiting for its timer.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<A> Drop for Debouncer<A> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.abort();
        }
    }
}
