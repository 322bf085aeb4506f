//! Query client: URL building, deduplication and normalization.

use std::sync::Arc;

use reqwest::Url;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dedup::{InFlightRegistry, QueryKey};
use crate::error::{QueryError, QueryResult};
use crate::fetch::{FetchOptions, ResilientFetcher};

use super::key::CanonicalQuery;
use super::models::{EventFeed, GeoTiffRef, HealthReport, Histogram, Report, Series, StatsResult};
use super::requests::{
    EventsQuery, GeoTiffQuery, HealthQuery, HistogramQuery, ReportQuery, ResourceQuery,
    StatsQuery, TimeseriesQuery,
};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/v1";

/// Issues domain queries through the dedup registry and the fetch core.
///
/// Concurrent identical queries share one network request. Queries carrying a
/// caller-owned cancellation token ([`QueryClient::query_with`]) bypass the
/// registry so that cancelling one consumer never cancels another's request.
pub struct QueryClient {
    base_url: Url,
    fetcher: ResilientFetcher,
    registry: Arc<InFlightRegistry<Arc<Value>>>,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("base_url", &self.base_url.as_str())
            .field("in_flight", &self.registry.len())
            .finish()
    }
}

impl QueryClient {
    /// Create a client for the API at `base_url`.
    pub fn new(base_url: &str, fetcher: ResilientFetcher) -> QueryResult<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(trimmed).map_err(|e| {
            QueryError::validation(format!("invalid API base URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(QueryError::validation(format!(
                "API base URL '{}' cannot have paths",
                trimmed
            )));
        }

        Ok(Self {
            base_url,
            fetcher,
            registry: Arc::new(InFlightRegistry::new()),
        })
    }

    /// API base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// The in-flight registry.
    pub fn registry(&self) -> &InFlightRegistry<Arc<Value>> {
        &self.registry
    }

    /// Full URL for an endpoint with its canonical parameters.
    pub fn url_for(&self, endpoint: &str, params: &CanonicalQuery) -> String {
        let mut url = self.base_url.clone();
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        url.set_path(&path);
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params.pairs() {
                pairs.append_pair(name, value);
            }
        }
        url.into()
    }

    /// Full URL for an endpoint served at the server root, outside the API
    /// base path.
    pub fn origin_url_for(&self, endpoint: &str) -> String {
        let mut url = self.base_url.clone();
        url.set_path(endpoint);
        url.set_query(None);
        url.into()
    }

    fn resolve<Q: ResourceQuery>(&self, query: &Q, params: &CanonicalQuery) -> String {
        let endpoint = query.endpoint();
        if query.at_origin() {
            self.origin_url_for(&endpoint)
        } else {
            self.url_for(&endpoint, params)
        }
    }

    /// Run a query, joining any identical query already in flight.
    pub async fn query<Q: ResourceQuery>(&self, query: &Q) -> QueryResult<Q::Output> {
        let params = query.params()?;
        let endpoint = query.endpoint();
        let key = params.key(&endpoint);
        let url = self.resolve(query, &params);
        let options = FetchOptions::new().with_profile(query.profile());

        debug!(key = %key, "Query");
        let fetcher = self.fetcher.clone();
        let body = self
            .registry
            .get_or_create(key.clone(), move || async move {
                let body = fetcher.fetch(&url, &options).await?.into_json()?;
                Ok(Arc::new(body))
            })
            .await;

        self.finish(query, &key, body)
    }

    /// Run a query under a caller-owned cancellation token, outside the
    /// dedup registry.
    pub async fn query_with<Q: ResourceQuery>(
        &self,
        query: &Q,
        cancel: CancellationToken,
    ) -> QueryResult<Q::Output> {
        let params = query.params()?;
        let endpoint = query.endpoint();
        let key = params.key(&endpoint);
        let url = self.resolve(query, &params);
        let options = FetchOptions::new()
            .with_profile(query.profile())
            .with_cancel(cancel);

        debug!(key = %key, "Query (cancellable)");
        let body = match self.fetcher.fetch(&url, &options).await {
            Ok(body) => body.into_json().map(Arc::new),
            Err(e) => Err(e),
        };

        self.finish(query, &key, body)
    }

    fn finish<Q: ResourceQuery>(
        &self,
        query: &Q,
        key: &QueryKey,
        body: QueryResult<Arc<Value>>,
    ) -> QueryResult<Q::Output> {
        match body {
            Ok(body) => query.normalize(&body),
            Err(QueryError::NoData { message }) => {
                info!(key = %key, upstream = %message, "No data for query");
                Err(QueryError::no_data(query.no_data_message().unwrap_or(message)))
            }
            Err(e) => Err(e),
        }
    }

    /// NDVI or BIOPAR statistics.
    pub async fn statistics(&self, query: &StatsQuery) -> QueryResult<StatsResult> {
        self.query(query).await
    }

    /// NDVI histogram.
    pub async fn histogram(&self, query: &HistogramQuery) -> QueryResult<Histogram> {
        self.query(query).await
    }

    /// NDVI or BIOPAR time series.
    pub async fn timeseries(&self, query: &TimeseriesQuery) -> QueryResult<Series> {
        self.query(query).await
    }

    /// GeoTIFF export reference.
    pub async fn geotiff(&self, query: &GeoTiffQuery) -> QueryResult<GeoTiffRef> {
        self.query(query).await
    }

    /// Analysis report.
    pub async fn report(&self, query: &ReportQuery) -> QueryResult<Report> {
        self.query(query).await
    }

    /// Natural events feed.
    pub async fn events(&self, query: &EventsQuery) -> QueryResult<EventFeed> {
        self.query(query).await
    }

    /// Server health.
    pub async fn health(&self) -> QueryResult<HealthReport> {
        self.query(&HealthQuery).await
    }
}
