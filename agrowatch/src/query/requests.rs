//! Typed query descriptions for each upstream resource.
//!
//! A [`ResourceQuery`] knows its endpoint, how to serialize and validate its
//! parameters, which timeout class it needs, and how to normalize the body.

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{QueryError, QueryResult};
use crate::fetch::FetchProfile;

use super::key::CanonicalQuery;
use super::models::{EventFeed, GeoTiffRef, HealthReport, Histogram, Report, Series, StatsResult};
use super::params::{validate_coordinates, validate_date, BoundingBox, DateRange, Product};
use super::wire;

/// Half-size in degrees of the box built around a point for point queries.
pub const POINT_BBOX_HALF_SIZE: f64 = 0.01;

/// Default number of acquisition dates for NDVI point series.
pub const DEFAULT_MAX_DATES: u32 = 15;

/// Default BIOPAR aggregation window in days.
pub const DEFAULT_AGG_DAYS: u32 = 10;

/// Default GeoTIFF edge length in pixels.
pub const DEFAULT_GEOTIFF_SIZE: u32 = 2048;

/// Largest GeoTIFF the server renders, in pixels.
pub const MAX_GEOTIFF_PIXELS: u64 = 67_000_000;

/// A query against one upstream resource.
pub trait ResourceQuery: Send + Sync {
    /// Normalized result.
    type Output: Send + 'static;

    /// Endpoint path relative to the API base, e.g. `/ndvi/hist`.
    fn endpoint(&self) -> String;

    /// Validate and serialize the parameters.
    fn params(&self) -> QueryResult<CanonicalQuery>;

    /// Whether [`endpoint`](Self::endpoint) is served at the server root
    /// rather than under the API base path.
    fn at_origin(&self) -> bool {
        false
    }

    /// Timeout class.
    fn profile(&self) -> FetchProfile {
        FetchProfile::Standard
    }

    /// Convert a successful body into the normalized result.
    fn normalize(&self, body: &Value) -> QueryResult<Self::Output>;

    /// User-facing text that replaces the server's no-data message.
    fn no_data_message(&self) -> Option<String> {
        None
    }
}

fn check_range(name: &str, value: u32, min: u32, max: u32) -> QueryResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(QueryError::validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )))
    }
}

fn product_endpoint(product: Product, ndvi: &str, biopar: &str) -> String {
    match product {
        Product::Ndvi => format!("/ndvi/{}", ndvi),
        Product::Biopar(_) => format!("/biopar/{}", biopar),
    }
}

fn period_no_data_message(range: &DateRange) -> String {
    format!(
        "No satellite data available for {}. Try a different date range or check cloud coverage.",
        range
    )
}

fn base_params(bbox: &BoundingBox, range: &DateRange) -> QueryResult<CanonicalQuery> {
    bbox.validate()?;
    range.validate()?;
    Ok(CanonicalQuery::new()
        .with("bbox", bbox)
        .with("start", range.start_str())
        .with("end", range.end_str()))
}

/// Aggregate statistics plus per-acquisition timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsQuery {
    pub product: Product,
    pub bbox: BoundingBox,
    pub range: DateRange,
}

impl StatsQuery {
    pub fn new(product: Product, bbox: BoundingBox, range: DateRange) -> Self {
        Self {
            product,
            bbox,
            range,
        }
    }
}

impl ResourceQuery for StatsQuery {
    type Output = StatsResult;

    fn endpoint(&self) -> String {
        product_endpoint(self.product, "statistics", "stats")
    }

    fn params(&self) -> QueryResult<CanonicalQuery> {
        Ok(base_params(&self.bbox, &self.range)?
            .with_opt("biopar_type", self.product.biopar_type()))
    }

    fn normalize(&self, body: &Value) -> QueryResult<StatsResult> {
        wire::stats(body)
    }

    fn no_data_message(&self) -> Option<String> {
        Some(period_no_data_message(&self.range))
    }
}

/// NDVI value distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramQuery {
    pub bbox: BoundingBox,
    pub range: DateRange,
    /// Custom bin edges; server defaults when `None`.
    pub bins: Option<Vec<f64>>,
}

impl HistogramQuery {
    pub fn new(bbox: BoundingBox, range: DateRange) -> Self {
        Self {
            bbox,
            range,
            bins: None,
        }
    }

    /// Use custom bin edges.
    pub fn with_bins(mut self, edges: Vec<f64>) -> Self {
        self.bins = Some(edges);
        self
    }

    fn bins_param(&self) -> QueryResult<Option<String>> {
        let Some(edges) = &self.bins else {
            return Ok(None);
        };
        if edges.len() < 2 {
            return Err(QueryError::validation("bins needs at least 2 edges"));
        }
        if edges.iter().any(|e| !e.is_finite() || !(-1.0..=1.0).contains(e)) {
            return Err(QueryError::validation("bin edges must be within [-1, 1]"));
        }
        if edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(QueryError::validation("bin edges must be strictly increasing"));
        }
        Ok(Some(
            edges
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ))
    }
}

impl ResourceQuery for HistogramQuery {
    type Output = Histogram;

    fn endpoint(&self) -> String {
        "/ndvi/hist".to_string()
    }

    fn params(&self) -> QueryResult<CanonicalQuery> {
        Ok(base_params(&self.bbox, &self.range)?.with_opt("bins", self.bins_param()?))
    }

    fn normalize(&self, body: &Value) -> QueryResult<Histogram> {
        wire::histogram(body)
    }

    fn no_data_message(&self) -> Option<String> {
        Some(period_no_data_message(&self.range))
    }
}

/// Time series at a point (NDVI) or over a small area (BIOPAR).
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesQuery {
    pub product: Product,
    pub lat: f64,
    pub lng: f64,
    /// Area containing the point; a small box around it when `None`.
    pub bbox: Option<BoundingBox>,
    pub range: DateRange,
    /// NDVI only: acquisition dates to return (1..=50).
    pub max_dates: u32,
    /// BIOPAR only: aggregation window in days (3..=30).
    pub agg_days: u32,
}

impl TimeseriesQuery {
    pub fn new(product: Product, lat: f64, lng: f64, range: DateRange) -> Self {
        Self {
            product,
            lat,
            lng,
            bbox: None,
            range,
            max_dates: DEFAULT_MAX_DATES,
            agg_days: DEFAULT_AGG_DAYS,
        }
    }

    /// Query within an explicit bounding box.
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_max_dates(mut self, max_dates: u32) -> Self {
        self.max_dates = max_dates;
        self
    }

    pub fn with_agg_days(mut self, agg_days: u32) -> Self {
        self.agg_days = agg_days;
        self
    }

    fn effective_bbox(&self) -> QueryResult<BoundingBox> {
        match self.bbox {
            Some(bbox) => {
                if !bbox.contains(self.lat, self.lng) {
                    return Err(QueryError::validation(
                        "point is outside the specified bounding box",
                    ));
                }
                Ok(bbox)
            }
            None => BoundingBox::around(self.lat, self.lng, POINT_BBOX_HALF_SIZE),
        }
    }
}

impl ResourceQuery for TimeseriesQuery {
    type Output = Series;

    fn endpoint(&self) -> String {
        product_endpoint(self.product, "timeseries", "timeseries")
    }

    fn params(&self) -> QueryResult<CanonicalQuery> {
        validate_coordinates(self.lat, self.lng)?;
        let params = base_params(&self.effective_bbox()?, &self.range)?;
        match self.product {
            Product::Ndvi => {
                check_range("max_dates", self.max_dates, 1, 50)?;
                Ok(params
                    .with("lat", self.lat)
                    .with("lon", self.lng)
                    .with("max_dates", self.max_dates))
            }
            Product::Biopar(kind) => {
                check_range("agg", self.agg_days, 3, 30)?;
                Ok(params.with("biopar_type", kind).with("agg", self.agg_days))
            }
        }
    }

    fn normalize(&self, body: &Value) -> QueryResult<Series> {
        wire::series(body)
    }

    fn no_data_message(&self) -> Option<String> {
        Some(period_no_data_message(&self.range))
    }
}

/// Server-rendered GeoTIFF export.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffQuery {
    pub product: Product,
    pub bbox: BoundingBox,
    pub range: DateRange,
    pub width: u32,
    pub height: u32,
    /// BIOPAR only: scene cloud cover limit in percent.
    pub max_cloud_coverage: Option<u32>,
}

impl GeoTiffQuery {
    pub fn new(product: Product, bbox: BoundingBox, range: DateRange) -> Self {
        Self {
            product,
            bbox,
            range,
            width: DEFAULT_GEOTIFF_SIZE,
            height: DEFAULT_GEOTIFF_SIZE,
            max_cloud_coverage: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_max_cloud_coverage(mut self, percent: u32) -> Self {
        self.max_cloud_coverage = Some(percent);
        self
    }
}

impl ResourceQuery for GeoTiffQuery {
    type Output = GeoTiffRef;

    fn endpoint(&self) -> String {
        product_endpoint(self.product, "geotiff", "geotiff")
    }

    fn params(&self) -> QueryResult<CanonicalQuery> {
        check_range("width", self.width, 64, 8192)?;
        check_range("height", self.height, 64, 8192)?;
        if u64::from(self.width) * u64::from(self.height) > MAX_GEOTIFF_PIXELS {
            return Err(QueryError::validation(format!(
                "image of {}x{} exceeds {} pixels",
                self.width, self.height, MAX_GEOTIFF_PIXELS
            )));
        }

        let params = base_params(&self.bbox, &self.range)?
            .with("width", self.width)
            .with("height", self.height);
        match self.product {
            Product::Ndvi => Ok(params),
            Product::Biopar(kind) => {
                if let Some(cloud) = self.max_cloud_coverage {
                    check_range("max_cloud_coverage", cloud, 0, 100)?;
                }
                Ok(params
                    .with("biopar_type", kind)
                    .with_opt("max_cloud_coverage", self.max_cloud_coverage))
            }
        }
    }

    fn profile(&self) -> FetchProfile {
        FetchProfile::Heavy
    }

    fn normalize(&self, body: &Value) -> QueryResult<GeoTiffRef> {
        wire::geotiff(body)
    }

    fn no_data_message(&self) -> Option<String> {
        Some(period_no_data_message(&self.range))
    }
}

/// Analysis report for a date.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    pub product: Product,
    pub bbox: BoundingBox,
    pub date: NaiveDate,
    /// BIOPAR only: days before `date` to analyze (7..=120).
    pub period_days: Option<u32>,
    /// BIOPAR only: aggregation window in days (3..=30).
    pub agg_days: Option<u32>,
}

impl ReportQuery {
    pub fn new(product: Product, bbox: BoundingBox, date: NaiveDate) -> Self {
        Self {
            product,
            bbox,
            date,
            period_days: None,
            agg_days: None,
        }
    }

    pub fn with_period_days(mut self, days: u32) -> Self {
        self.period_days = Some(days);
        self
    }
}

impl ResourceQuery for ReportQuery {
    type Output = Report;

    fn endpoint(&self) -> String {
        product_endpoint(self.product, "report", "report")
    }

    fn params(&self) -> QueryResult<CanonicalQuery> {
        self.bbox.validate()?;
        validate_date(self.date)?;
        let params = CanonicalQuery::new()
            .with("bbox", self.bbox)
            .with("date", self.date.format(super::params::DATE_FORMAT));

        match self.product {
            Product::Ndvi => Ok(params),
            Product::Biopar(kind) => {
                if let Some(days) = self.period_days {
                    check_range("period_days", days, 7, 120)?;
                }
                if let Some(agg) = self.agg_days {
                    check_range("agg", agg, 3, 30)?;
                }
                Ok(params
                    .with("biopar_type", kind)
                    .with_opt("period_days", self.period_days)
                    .with_opt("agg", self.agg_days))
            }
        }
    }

    fn normalize(&self, body: &Value) -> QueryResult<Report> {
        wire::report(body)
    }

    fn no_data_message(&self) -> Option<String> {
        Some(format!(
            "Not enough satellite data to build a report for {}. Try a different date.",
            self.date
        ))
    }
}

/// Open/closed filter for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventStatus {
    #[default]
    Open,
    Closed,
    All,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Open => "open",
            EventStatus::Closed => "closed",
            EventStatus::All => "all",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(EventStatus::Open),
            "closed" => Ok(EventStatus::Closed),
            "all" => Ok(EventStatus::All),
            other => Err(QueryError::validation(format!(
                "event status must be open, closed or all, got '{}'",
                other
            ))),
        }
    }
}

/// Natural events feed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventsQuery {
    pub range: Option<DateRange>,
    pub status: EventStatus,
    pub bbox: Option<BoundingBox>,
    /// Page size (1..=1000).
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl EventsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

impl ResourceQuery for EventsQuery {
    type Output = EventFeed;

    fn endpoint(&self) -> String {
        "/events".to_string()
    }

    fn params(&self) -> QueryResult<CanonicalQuery> {
        if let Some(range) = &self.range {
            range.validate()?;
        }
        if let Some(bbox) = &self.bbox {
            bbox.validate()?;
        }
        if let Some(limit) = self.limit {
            check_range("limit", limit, 1, 1000)?;
        }

        Ok(CanonicalQuery::new()
            .with("status", self.status.as_str())
            .with_opt("start", self.range.map(|r| r.start_str()))
            .with_opt("end", self.range.map(|r| r.end_str()))
            .with_opt("bbox", self.bbox)
            .with_opt("limit", self.limit)
            .with_opt("offset", self.offset))
    }

    fn normalize(&self, body: &Value) -> QueryResult<EventFeed> {
        wire::events(body)
    }
}

/// Server health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthQuery;

impl ResourceQuery for HealthQuery {
    type Output = HealthReport;

    fn endpoint(&self) -> String {
        "/health".to_string()
    }

    fn at_origin(&self) -> bool {
        true
    }

    fn params(&self) -> QueryResult<CanonicalQuery> {
        Ok(CanonicalQuery::new())
    }

    fn normalize(&self, body: &Value) -> QueryResult<HealthReport> {
        wire::health(body)
    }
}
