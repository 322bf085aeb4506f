//! Repeating task handle with explicit start/stop.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A timer that calls a tick function every `period` until stopped.
///
/// The first tick fires one period after `start`. A tick returning
/// [`ControlFlow::Break`] stops the task from the inside. Ticks never overlap:
/// a slow tick delays the next one instead of stacking.
pub struct RepeatingTask {
    name: String,
    running: Mutex<Option<Running>>,
}

impl RepeatingTask {
    /// Create a stopped task. The name only appears in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: Mutex::new(None),
        }
    }

    /// Start ticking. Returns `false` (and does nothing) if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, period: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.cancel.is_cancelled()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let name = self.name.clone();
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if tick().await.is_break() {
                    debug!(task = %name, "Repeating task stopped itself");
                    token.cancel();
                    break;
                }
            }
        });

        debug!(task = %self.name, period_ms = period.as_millis() as u64, "Repeating task started");
        *running = Some(Running { cancel, handle });
        true
    }

    /// Stop ticking. Idempotent. Returns whether the task was running.
    ///
    /// A tick in progress is aborted.
    pub fn stop(&self) -> bool {
        match self.running.lock().take() {
            Some(running) => {
                let was_running = !running.cancel.is_cancelled();
                running.cancel.cancel();
                running.handle.abort();
                if was_running {
                    debug!(task = %self.name, "Repeating task stopped");
                }
                was_running
            }
            None => false,
        }
    }

    /// Whether the task is ticking.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled())
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period() {
        let task = RepeatingTask::new("test");
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        assert!(task.start(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { ControlFlow::Continue(()) }
        }));
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        assert!(task.stop());
        assert!(!task.is_running());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_rejected() {
        let task = RepeatingTask::new("test");
        assert!(task.start(Duration::from_secs(1), || async { ControlFlow::Continue(()) }));
        assert!(!task.start(Duration::from_secs(1), || async { ControlFlow::Continue(()) }));
        assert!(task.stop());
        assert!(!task.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_stops_task() {
        let task = RepeatingTask::new("test");
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        task.start(Duration::from_millis(10), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(!task.is_running());

        // Can be restarted after stopping itself
        assert!(task.start(Duration::from_millis(10), || async { ControlFlow::Continue(()) }));
    }
}
