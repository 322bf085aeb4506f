//! Resilient fetch core.
//!
//! [`ResilientFetcher`] wraps an [`HttpTransport`] with a per-attempt timeout,
//! bounded retry with backoff, and typed error classification. A caller may
//! pass its own [`CancellationToken`]; when it does, that token is the only
//! cancellation source for the call and the fetcher does not arm a timeout of
//! its own (the transport's configured ceiling still bounds the I/O).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{QueryError, QueryResult};

use super::classify::{classify_response, classify_transport};
use super::http::{HttpTransport, RawResponse};
use super::policy::RetryPolicy;

/// Default timeout for standard endpoints (30 seconds).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for heavy satellite-compute endpoints (180 seconds).
pub const DEFAULT_HEAVY_TIMEOUT_MS: u64 = 180_000;

/// Which timeout class a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchProfile {
    /// Statistics, histograms, time series, reports, events.
    #[default]
    Standard,
    /// Endpoints that render imagery on the server (GeoTIFF export).
    Heavy,
}

/// Fetcher-wide defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Attempt timeout for [`FetchProfile::Standard`].
    pub timeout: Duration,
    /// Attempt timeout for [`FetchProfile::Heavy`].
    pub heavy_timeout: Duration,
    /// Retry policy when the caller does not override it.
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            heavy_timeout: Duration::from_millis(DEFAULT_HEAVY_TIMEOUT_MS),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchConfig {
    /// Set the standard timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the heavy timeout.
    pub fn with_heavy_timeout(mut self, timeout: Duration) -> Self {
        self.heavy_timeout = timeout;
        self
    }

    /// Set the default retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attempt timeout for the given profile.
    pub fn timeout_for(&self, profile: FetchProfile) -> Duration {
        match profile {
            FetchProfile::Standard => self.timeout,
            FetchProfile::Heavy => self.heavy_timeout,
        }
    }

    /// Longest attempt timeout of any profile. The transport's hard ceiling
    /// must not be lower.
    pub fn max_timeout(&self) -> Duration {
        self.timeout.max(self.heavy_timeout)
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Timeout class, used when `timeout` is not set.
    pub profile: FetchProfile,
    /// Explicit attempt timeout.
    pub timeout: Option<Duration>,
    /// Explicit retry policy.
    pub retry: Option<RetryPolicy>,
    /// Caller-owned cancellation source.
    pub cancel: Option<CancellationToken>,
    /// Return the body as bytes instead of parsing JSON.
    pub raw: bool,
}

impl FetchOptions {
    /// Options for a standard request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a heavy request.
    pub fn heavy() -> Self {
        Self {
            profile: FetchProfile::Heavy,
            ..Self::default()
        }
    }

    /// Set the timeout class.
    pub fn with_profile(mut self, profile: FetchProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Override the attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Use a caller-owned cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Return the raw body.
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }
}

/// A successful response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Parsed JSON.
    Json(serde_json::Value),
    /// Unparsed bytes (requested with [`FetchOptions::raw`]).
    Raw(Bytes),
}

impl Body {
    /// The JSON value, or `InvalidResponse` for a raw body.
    pub fn into_json(self) -> QueryResult<serde_json::Value> {
        match self {
            Body::Json(value) => Ok(value),
            Body::Raw(_) => Err(QueryError::InvalidResponse(
                "expected a JSON body".to_string(),
            )),
        }
    }

    /// The raw bytes, re-serializing JSON if needed.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Body::Json(value) => Bytes::from(value.to_string()),
            Body::Raw(bytes) => bytes,
        }
    }
}

/// Retry bookkeeping for one logical call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Attempts made so far, including the first.
    pub attempts: u32,
    /// Delay waited before the most recent retry.
    pub last_delay: Option<Duration>,
    /// Error that triggered the most recent retry, or the final error.
    pub last_error: Option<QueryError>,
}

/// Fetches URLs with timeout, retry and error classification.
#[derive(Clone)]
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    config: FetchConfig,
}

impl std::fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResilientFetcher {
    /// Create a fetcher over the given transport.
    pub fn new(transport: Arc<dyn HttpTransport>, config: FetchConfig) -> Self {
        Self { transport, config }
    }

    /// Fetcher-wide defaults.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch a URL.
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> QueryResult<Body> {
        let mut state = RetryState::default();
        self.fetch_with_state(url, options, &mut state).await
    }

    /// Fetch a URL, recording retry bookkeeping into `state`.
    ///
    /// Exhausting retries surfaces the last classified error.
    pub async fn fetch_with_state(
        &self,
        url: &str,
        options: &FetchOptions,
        state: &mut RetryState,
    ) -> QueryResult<Body> {
        let policy = options.retry.as_ref().unwrap_or(&self.config.retry);
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.config.timeout_for(options.profile));
        let cancel = options.cancel.as_ref();

        loop {
            if cancel.is_some_and(|t| t.is_cancelled()) {
                state.last_error = Some(QueryError::Cancelled);
                return Err(QueryError::Cancelled);
            }

            state.attempts += 1;
            debug!(url = %url, attempt = state.attempts, "Fetching");

            let (error, retry_after) = match self.attempt(url, timeout, cancel).await {
                Ok(response) => match classify_response(&response) {
                    Ok(()) => return parse_body(response, options.raw),
                    Err(e) => (e, response.retry_after),
                },
                Err(e) => (e, None),
            };

            if error.is_terminal() {
                debug!(url = %url, attempt = state.attempts, error = %error, "Terminal error");
                state.last_error = Some(error.clone());
                return Err(error);
            }

            let Some(backoff) = policy.delay_for_attempt(state.attempts - 1) else {
                warn!(
                    url = %url,
                    attempts = state.attempts,
                    error = %error,
                    "Retries exhausted"
                );
                state.last_error = Some(error.clone());
                return Err(error);
            };

            let delay = match (&error, retry_after) {
                (QueryError::Api { status: 429, .. }, Some(server_delay)) => server_delay,
                _ => backoff,
            };

            warn!(
                url = %url,
                attempt = state.attempts,
                status = ?error.status(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying request"
            );
            state.last_delay = Some(delay);
            state.last_error = Some(error);

            sleep_unless_cancelled(delay, cancel).await?;
        }
    }

    /// One attempt: exactly one cancellation source governs it.
    async fn attempt(
        &self,
        url: &str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> QueryResult<RawResponse> {
        let result = match cancel {
            Some(token) => {
                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(QueryError::Cancelled),
                    outcome = self.transport.get(url) => outcome,
                };
                // A response that lands after cancellation belongs to a
                // superseded request.
                if token.is_cancelled() {
                    return Err(QueryError::Cancelled);
                }
                outcome
            }
            None => match tokio::time::timeout(timeout, self.transport.get(url)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(QueryError::Timeout {
                        url: url.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            },
        };

        result.map_err(|failure| classify_transport(url, failure, timeout))
    }
}

fn parse_body(response: RawResponse, raw: bool) -> QueryResult<Body> {
    if raw {
        return Ok(Body::Raw(response.body));
    }
    serde_json::from_slice(&response.body)
        .map(Body::Json)
        .map_err(|e| QueryError::InvalidResponse(format!("body is not valid JSON: {}", e)))
}

async fn sleep_unless_cancelled(
    delay: Duration,
    cancel: Option<&CancellationToken>,
) -> QueryResult<()> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(QueryError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        },
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::http::tests::ScriptedTransport;
    use crate::fetch::http::TransportFailure;
    use serde_json::json;

    fn fetcher(transport: Arc<ScriptedTransport>, retry: RetryPolicy) -> ResilientFetcher {
        ResilientFetcher::new(transport, FetchConfig::default().with_retry(retry))
    }

    #[test]
    fn test_max_timeout_covers_every_profile() {
        assert_eq!(
            FetchConfig::default().max_timeout(),
            Duration::from_millis(DEFAULT_HEAVY_TIMEOUT_MS)
        );
        let config = FetchConfig::default().with_heavy_timeout(Duration::from_secs(300));
        assert_eq!(config.max_timeout(), Duration::from_secs(300));
        let config = FetchConfig::default()
            .with_timeout(Duration::from_secs(400))
            .with_heavy_timeout(Duration::from_secs(60));
        assert_eq!(config.max_timeout(), Duration::from_secs(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_503_three_times_then_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(RawResponse::new(503, "unavailable")),
            Ok(RawResponse::new(503, "unavailable")),
            Ok(RawResponse::new(503, "unavailable")),
            Ok(RawResponse::json(&json!({"status": "success", "series": []}))),
        ]));
        let fetcher = fetcher(
            transport.clone(),
            RetryPolicy::exponential(3, Duration::from_millis(3000)),
        );

        let mut state = RetryState::default();
        let body = fetcher
            .fetch_with_state("http://api/ndvi/timeseries", &FetchOptions::new(), &mut state)
            .await
            .unwrap();

        assert_eq!(body, Body::Json(json!({"status": "success", "series": []})));
        assert_eq!(transport.calls(), 4);
        assert_eq!(state.attempts, 4);
        assert_eq!(state.last_delay, Some(Duration::from_millis(12_000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_data_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
            400,
            "No satellite data found",
        ))]));
        let fetcher = fetcher(transport.clone(), RetryPolicy::default());

        let err = fetcher
            .fetch("http://api/ndvi/hist", &FetchOptions::new())
            .await
            .unwrap_err();

        assert!(err.is_no_data());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_400_is_terminal() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
            400,
            "Invalid bbox",
        ))]));
        let fetcher = fetcher(transport.clone(), RetryPolicy::default());

        let err = fetcher
            .fetch("http://api/ndvi/hist", &FetchOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err, QueryError::api(400, "Invalid bbox"));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_4xx_is_terminal() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
            403, "forbidden",
        ))]));
        let fetcher = fetcher(transport.clone(), RetryPolicy::default());

        let err = fetcher
            .fetch("http://api/x", &FetchOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_honors_retry_after() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(RawResponse::new(429, "slow down").with_retry_after(Duration::from_secs(7))),
            Ok(RawResponse::json(&json!({"ok": true}))),
        ]));
        let fetcher = fetcher(
            transport.clone(),
            RetryPolicy::exponential(2, Duration::from_millis(100)),
        );

        let start = tokio::time::Instant::now();
        let mut state = RetryState::default();
        fetcher
            .fetch_with_state("http://api/health", &FetchOptions::new(), &mut state)
            .await
            .unwrap();

        assert_eq!(state.last_delay, Some(Duration::from_secs(7)));
        assert!(start.elapsed() >= Duration::from_secs(7));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_without_header_uses_backoff() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
            429, "busy",
        ))]));
        let fetcher = fetcher(
            transport.clone(),
            RetryPolicy::fixed(1, Duration::from_millis(500)),
        );

        let mut state = RetryState::default();
        let err = fetcher
            .fetch_with_state("http://api/x", &FetchOptions::new(), &mut state)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(429));
        assert_eq!(state.last_delay, Some(Duration::from_millis(500)));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_exhausts_retries() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(
            TransportFailure::Connect("connection refused".into()),
        )]));
        let fetcher = fetcher(
            transport.clone(),
            RetryPolicy::exponential(2, Duration::from_millis(10)),
        );

        let mut state = RetryState::default();
        let err = fetcher
            .fetch_with_state("http://api/x", &FetchOptions::new(), &mut state)
            .await
            .unwrap_err();

        assert_eq!(err, QueryError::Network("connection refused".into()));
        assert_eq!(transport.calls(), 3);
        assert_eq!(state.attempts, 3);
        assert_eq!(state.last_error, Some(err));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_classified() {
        let transport = Arc::new(ScriptedTransport::from_script(vec![None]));
        let fetcher = fetcher(transport.clone(), RetryPolicy::none());

        let err = fetcher
            .fetch(
                "http://api/slow",
                &FetchOptions::new().with_timeout(Duration::from_secs(2)),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            QueryError::Timeout {
                url: "http://api/slow".into(),
                timeout_ms: 2000
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_heavy_profile_uses_long_timeout() {
        let transport = Arc::new(
            ScriptedTransport::new(vec![Ok(RawResponse::json(&json!({"status": "success"})))])
                .with_delay(Duration::from_secs(60)),
        );
        let fetcher = fetcher(transport.clone(), RetryPolicy::none());

        assert!(fetcher
            .fetch("http://api/ndvi/geotiff", &FetchOptions::heavy())
            .await
            .is_ok());

        let err = fetcher
            .fetch("http://api/ndvi/geotiff", &FetchOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout { timeout_ms: 30_000, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_settles_as_cancelled() {
        let transport = Arc::new(ScriptedTransport::from_script(vec![None]));
        let fetcher = fetcher(transport.clone(), RetryPolicy::default());
        let token = CancellationToken::new();

        let options = FetchOptions::new().with_cancel(token.clone());
        let task = tokio::spawn(async move { fetcher.fetch("http://api/x", &options).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        assert_eq!(task.await.unwrap(), Err(QueryError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
            502, "bad gateway",
        ))]));
        let fetcher = fetcher(
            transport.clone(),
            RetryPolicy::fixed(5, Duration::from_secs(10)),
        );
        let token = CancellationToken::new();

        let options = FetchOptions::new().with_cancel(token.clone());
        let task = tokio::spawn(async move { fetcher.fetch("http://api/x", &options).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        assert_eq!(task.await.unwrap(), Err(QueryError::Cancelled));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_json_is_invalid_response() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
            200, "<html>",
        ))]));
        let fetcher = fetcher(transport.clone(), RetryPolicy::default());

        let err = fetcher
            .fetch("http://api/x", &FetchOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidResponse(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_raw_body() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::new(
            200, "II*\0",
        ))]));
        let fetcher = fetcher(transport, RetryPolicy::none());

        let body = fetcher
            .fetch("http://api/file.tif", &FetchOptions::new().raw())
            .await
            .unwrap();
        assert_eq!(body, Body::Raw(Bytes::from_static(b"II*\0")));
    }
}
