//! Normalized results returned by the query layer.
//!
//! These are plain data: presentation code renders them without branching on
//! upstream schema differences between NDVI and BIOPAR.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

/// One dated observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub mean: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    /// Named percentiles such as `p10` or `p50`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub percentiles: BTreeMap<String, f64>,
}

impl SeriesPoint {
    /// A point with only a mean value.
    pub fn new(date: NaiveDate, mean: f64) -> Self {
        Self {
            date,
            mean,
            min: None,
            max: None,
            std: None,
            percentiles: BTreeMap::new(),
        }
    }
}

/// Aggregate statistics over a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub mean: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std: Option<f64>,
    pub median: Option<f64>,
    pub observations: Option<u64>,
}

/// Result of a statistics query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResult {
    pub statistics: Statistics,
    /// Per-acquisition values, ordered by date.
    pub timeline: Vec<SeriesPoint>,
    pub products_available: u64,
}

/// One histogram class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub min: f64,
    pub max: f64,
    pub count: u64,
    pub pct: f64,
    pub label: String,
}

/// Distribution of index values over an area.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub bins: Vec<HistogramBin>,
    /// Valid pixels counted.
    pub total: u64,
}

/// Ordered time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub points: Vec<SeriesPoint>,
}

impl Series {
    /// Whether the series has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Reference to a rendered GeoTIFF on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoTiffRef {
    pub tiff_url: String,
    pub filename: String,
}

/// Textual analysis report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub date: NaiveDate,
    /// Headline vegetation status, when the report has one.
    pub summary: Option<String>,
    /// The full report document.
    pub payload: serde_json::Value,
}

/// A natural event in or near the region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub categories: Vec<String>,
    /// Closing timestamp; `None` while the event is open.
    pub closed: Option<String>,
    /// First point geometry as `(lat, lng)`, if any.
    pub location: Option<(f64, f64)>,
}

impl EventSummary {
    /// Whether the event is still open.
    pub fn is_open(&self) -> bool {
        self.closed.is_none()
    }
}

/// A page of events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventFeed {
    pub events: Vec<EventSummary>,
    /// Events matching the filter before pagination.
    pub total: u64,
    /// Whether the server answered from its cache.
    pub cached: bool,
    /// Error reported by the upstream event source, if it failed.
    pub upstream_error: Option<String>,
}

/// Server health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    /// Per-dependency status.
    pub checks: BTreeMap<String, bool>,
}
