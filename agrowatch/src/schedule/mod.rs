//! Timers for UI-driven work.
//!
//! - [`Debouncer`]: one call after a burst settles (slider drag)
//! - [`Throttle`]: at most one call per interval (map pan)
//! - [`RepeatingTask`]: start/stop ticking handle (animation playback)
//!
//! All timers run on `tokio::time`, so tests drive them with a paused clock.

mod debounce;
mod repeating;
mod throttle;

pub use debounce::Debouncer;
pub use repeating::RepeatingTask;
pub use throttle::Throttle;

/// Default quiet period for debounced input.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Default minimum interval between throttled calls.
pub const DEFAULT_THROTTLE_MS: u64 = 300;
