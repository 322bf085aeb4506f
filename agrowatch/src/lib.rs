//! AgroWatch - client core for a satellite vegetation monitoring API.
//!
//! Queries NDVI and BIOPAR statistics, histograms, time series, GeoTIFF
//! exports, reports and natural events from the AgroWatch server, with the
//! request plumbing an interactive map needs: retry with backoff, shared
//! in-flight requests, cancellation of superseded work, debounce/throttle
//! timers, out-of-order response protection, animation playback and saved
//! pins.
//!
//! # Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`fetch`] | Timeouts, bounded retry, typed error classification |
//! | [`dedup`] | One request per key; newest-wins slots |
//! | [`schedule`] | Debounce, throttle, repeating tasks |
//! | [`query`] | Validated domain queries and normalized results |
//! | [`stale`] | Discards responses to superseded requests |
//! | [`animation`] | Time-index playback over a timeline |
//! | [`pins`] | Persisted points of interest |
//! | [`session`] | Owns all shared state for one session |
//! | [`config`] | INI configuration file |

pub mod animation;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod pins;
pub mod query;
pub mod schedule;
pub mod session;
pub mod stale;

pub use error::{QueryError, QueryResult, UserMessage};
pub use session::{PinStoreConfig, Session, SessionConfig};
