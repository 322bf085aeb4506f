//! HTTP transport abstraction for testability

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use thiserror::Error;

use crate::error::QueryError;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Upper bound on any single request made by [`ReqwestTransport`].
///
/// Matches the heavy satellite-compute timeout so the transport never cuts a
/// request short of what the fetch core allows.
pub const DEFAULT_TRANSPORT_TIMEOUT_SECS: u64 = 180;

/// A response as it came off the wire, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed `Retry-After` header, if present.
    pub retry_after: Option<Duration>,
    /// Response body.
    pub body: Bytes,
}

impl RawResponse {
    /// Create a response with the given status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    /// Create a 200 response with a JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string())
    }

    /// Attach a `Retry-After` delay.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure below the HTTP layer: no response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// The transport gave up waiting.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport error.
    #[error("{0}")]
    Other(String),
}

/// Trait for HTTP transport operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling scripted transports in tests. Implementations return every
/// HTTP status as a [`RawResponse`]; only failures to get a response at all
/// are errors.
pub trait HttpTransport: Send + Sync {
    /// Performs an HTTP GET request.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RawResponse, TransportFailure>>;
}

/// Real HTTP transport implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a new transport with the default request ceiling.
    pub fn new() -> Result<Self, QueryError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TRANSPORT_TIMEOUT_SECS))
    }

    /// Creates a new transport with a custom request ceiling.
    pub fn with_timeout(timeout: Duration) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RawResponse, TransportFailure>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .header(ACCEPT, "application/json")
                .send()
                .await
                .map_err(transport_failure)?;

            let status = response.status().as_u16();
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );

            let body = response.bytes().await.map_err(transport_failure)?;

            Ok(RawResponse {
                status,
                retry_after,
                body,
            })
        })
    }
}

fn transport_failure(e: reqwest::Error) -> TransportFailure {
    if e.is_timeout() {
        TransportFailure::Timeout
    } else if e.is_connect() {
        TransportFailure::Connect(e.to_string())
    } else {
        TransportFailure::Other(e.to_string())
    }
}

/// Parse a `Retry-After` header given in seconds.
///
/// HTTP-date values are not supported and yield `None`, which makes the
/// caller fall back to its configured delay.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    let secs: f64 = value?.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
