//! Time-series animation playback.

mod controller;

pub use controller::{AnimationController, PlaybackState, DEFAULT_INTERVAL_MS};
