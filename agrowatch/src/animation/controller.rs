//! Temporal animation controller.
//!
//! # State Machine
//!
//! ```text
//!            start()                 stop() / start() / fatal tick
//!  Stopped ----------> Playing ----------------------------------> Stopped
//! ```
//!
//! Each tick hands `(index, timeline[index])` to the tick function, then
//! advances the index modulo the timeline length, so playback loops until
//! stopped. A tick failing with a server-fatal error (HTTP 5xx) stops
//! playback and is kept in [`AnimationController::last_error`]; any other
//! tick error is logged and playback moves on.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{QueryError, QueryResult};
use crate::fetch::BoxFuture;
use crate::schedule::RepeatingTask;

/// Default time between frames.
pub const DEFAULT_INTERVAL_MS: u64 = 1500;

/// Playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

type TickFn<T> = Arc<dyn Fn(usize, T) -> BoxFuture<'static, QueryResult<()>> + Send + Sync>;
type FatalHandler = Arc<dyn Fn(&QueryError) + Send + Sync>;

struct Frames<T> {
    timeline: Arc<Vec<T>>,
    index: usize,
    last_error: Option<QueryError>,
}

/// Drives a time index over a timeline on a repeating timer.
pub struct AnimationController<T> {
    task: RepeatingTask,
    frames: Arc<Mutex<Frames<T>>>,
    on_fatal: Option<FatalHandler>,
}

impl<T> Default for AnimationController<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AnimationController<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a stopped controller with an empty timeline.
    pub fn new() -> Self {
        Self {
            task: RepeatingTask::new("animation"),
            frames: Arc::new(Mutex::new(Frames {
                timeline: Arc::new(Vec::new()),
                index: 0,
                last_error: None,
            })),
            on_fatal: None,
        }
    }

    /// Called with the error when playback stops on a server-fatal tick.
    pub fn with_fatal_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&QueryError) + Send + Sync + 'static,
    {
        self.on_fatal = Some(Arc::new(handler));
        self
    }

    /// Toggle playback.
    ///
    /// When stopped, starts playing `timeline` from index 0 and returns
    /// [`PlaybackState::Playing`]. When already playing, stops instead; a
    /// second timer is never stacked. An empty timeline stays stopped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, timeline: Vec<T>, tick: F, interval: Duration) -> PlaybackState
    where
        F: Fn(usize, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResult<()>> + Send + 'static,
    {
        if self.task.is_running() {
            self.stop();
            return PlaybackState::Stopped;
        }
        if timeline.is_empty() {
            warn!("Animation not started: timeline is empty");
            return PlaybackState::Stopped;
        }

        let frame_count = timeline.len();
        {
            let mut frames = self.frames.lock();
            frames.timeline = Arc::new(timeline);
            frames.index = 0;
            frames.last_error = None;
        }

        let tick: TickFn<T> = Arc::new(move |index, item| Box::pin(tick(index, item)));
        let frames = Arc::clone(&self.frames);
        let on_fatal = self.on_fatal.clone();

        self.task.start(interval, move || {
            let frames = Arc::clone(&frames);
            let tick = Arc::clone(&tick);
            let on_fatal = on_fatal.clone();
            async move { run_tick(&frames, &tick, on_fatal.as_ref()).await }
        });

        info!(frames = frame_count, interval_ms = interval.as_millis() as u64, "Animation started");
        PlaybackState::Playing
    }

    /// Stop playback. Idempotent.
    pub fn stop(&self) {
        if self.task.stop() {
            info!("Animation stopped");
        }
        self.frames.lock().index = 0;
    }

    /// Replace the timeline. Playback stops because the frames it was
    /// stepping through no longer exist.
    pub fn set_timeline(&self, timeline: Vec<T>) {
        self.stop();
        let mut frames = self.frames.lock();
        frames.timeline = Arc::new(timeline);
        frames.index = 0;
    }

    /// Current playback state.
    pub fn state(&self) -> PlaybackState {
        if self.task.is_running() {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    /// Index of the next frame to show.
    pub fn current_index(&self) -> usize {
        self.frames.lock().index
    }

    /// Number of frames in the timeline.
    pub fn len(&self) -> usize {
        self.frames.lock().timeline.len()
    }

    /// Whether the timeline is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The error that stopped the last playback, if any.
    pub fn last_error(&self) -> Option<QueryError> {
        self.frames.lock().last_error.clone()
    }
}

async fn run_tick<T: Clone>(
    frames: &Mutex<Frames<T>>,
    tick: &TickFn<T>,
    on_fatal: Option<&FatalHandler>,
) -> ControlFlow<()> {
    let (index, item) = {
        let frames = frames.lock();
        let len = frames.timeline.len();
        if len == 0 {
            return ControlFlow::Break(());
        }
        let index = frames.index % len;
        (index, frames.timeline[index].clone())
    };

    match tick(index, item).await {
        Ok(()) => {}
        Err(e) if e.is_server_fatal() => {
            warn!(index, error = %e, "Animation stopped on server error");
            frames.lock().last_error = Some(e.clone());
            if let Some(handler) = on_fatal {
                handler(&e);
            }
            return ControlFlow::Break(());
        }
        Err(e) => {
            warn!(index, error = %e, "Animation frame failed, continuing");
        }
    }

    let mut frames = frames.lock();
    let len = frames.timeline.len().max(1);
    frames.index = (index + 1) % len;
    ControlFlow::Continue(())
}
