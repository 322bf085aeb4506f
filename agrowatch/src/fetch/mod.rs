//! Resilient fetch core.
//!
//! Wraps the HTTP transport with timeouts, bounded retry with backoff and
//! typed error classification.
//!
//! # Components
//!
//! - [`HttpTransport`]: transport seam, implemented by [`ReqwestTransport`]
//! - [`RetryPolicy`]: backoff schedule
//! - [`classify`]: the single point where raw results become [`QueryError`]s
//! - [`ResilientFetcher`]: the attempt loop
//!
//! [`QueryError`]: crate::error::QueryError

pub mod classify;
mod client;
pub mod http;
mod policy;

pub use client::{
    Body, FetchConfig, FetchOptions, FetchProfile, ResilientFetcher, RetryState,
    DEFAULT_HEAVY_TIMEOUT_MS, DEFAULT_TIMEOUT_MS,
};
pub use http::{BoxFuture, HttpTransport, RawResponse, ReqwestTransport, TransportFailure};
pub use policy::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_MAX_DELAY_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY_MS,
};
