//! Upstream response shapes and their normalization.
//!
//! A 2xx body that fails these expectations is [`QueryError::InvalidResponse`]:
//! the contract is broken, so it is never retried.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{QueryError, QueryResult};
use crate::fetch::classify::classify_error_status;

use super::models::{
    EventFeed, EventSummary, GeoTiffRef, HealthReport, Histogram, HistogramBin, Report, Series,
    SeriesPoint, Statistics, StatsResult,
};
use super::params::DATE_FORMAT;

/// Require `status == "success"`.
///
/// A 200 carrying `status: "error"` with a no-data message is still a
/// no-data outcome.
pub fn expect_success(body: &Value) -> QueryResult<()> {
    match body.get("status").and_then(Value::as_str) {
        Some("success") => Ok(()),
        Some("error") => {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("upstream reported an error");
            Err(classify_error_status(message))
        }
        Some(other) => Err(QueryError::InvalidResponse(format!(
            "unexpected status '{}'",
            other
        ))),
        None => Err(QueryError::InvalidResponse(
            "response has no status field".to_string(),
        )),
    }
}

fn decode<T: DeserializeOwned>(body: &Value) -> QueryResult<T> {
    T::deserialize(body).map_err(|e| QueryError::InvalidResponse(e.to_string()))
}

fn parse_wire_date(value: &str) -> QueryResult<NaiveDate> {
    // Some sources append a time component.
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, DATE_FORMAT)
        .map_err(|_| QueryError::InvalidResponse(format!("invalid date '{}'", value)))
}

/// Aggregate statistics. NDVI and BIOPAR spell the fields differently and
/// some payloads carry both spellings, so each one is its own field.
#[derive(Debug, Deserialize)]
struct WireStatistics {
    #[serde(default)]
    mean: Option<f64>,
    #[serde(default)]
    mean_ndvi: Option<f64>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    min_ndvi: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    max_ndvi: Option<f64>,
    #[serde(default)]
    std: Option<f64>,
    #[serde(default)]
    std_ndvi: Option<f64>,
    #[serde(default)]
    median: Option<f64>,
    #[serde(default)]
    median_ndvi: Option<f64>,
    #[serde(default)]
    total_observations: Option<u64>,
    #[serde(default)]
    observations_count: Option<u64>,
}

impl WireStatistics {
    fn into_statistics(self) -> QueryResult<Statistics> {
        let mean = self.mean.or(self.mean_ndvi).ok_or_else(|| {
            QueryError::InvalidResponse("statistics have no mean".to_string())
        })?;
        Ok(Statistics {
            mean,
            min: self.min.or(self.min_ndvi),
            max: self.max.or(self.max_ndvi),
            std: self.std.or(self.std_ndvi),
            median: self.median.or(self.median_ndvi),
            observations: self.total_observations.or(self.observations_count),
        })
    }
}

/// Any dated point: NDVI and BIOPAR timelines and series.
///
/// BIOPAR points repeat every value under a second name (`mean_value` and
/// `mean`), so the spellings cannot be serde aliases of one field.
#[derive(Debug, Deserialize)]
struct WirePoint {
    date: String,
    #[serde(default)]
    mean: Option<f64>,
    #[serde(default)]
    mean_ndvi: Option<f64>,
    #[serde(default)]
    mean_value: Option<f64>,
    #[serde(default)]
    ndvi: Option<f64>,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    min_ndvi: Option<f64>,
    #[serde(default)]
    min_value: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    max_ndvi: Option<f64>,
    #[serde(default)]
    max_value: Option<f64>,
    #[serde(default)]
    std: Option<f64>,
    #[serde(default)]
    std_ndvi: Option<f64>,
    #[serde(default)]
    std_value: Option<f64>,
    #[serde(default)]
    percentiles: Option<BTreeMap<String, Option<f64>>>,
    #[serde(default)]
    p50: Option<f64>,
    #[serde(default)]
    median: Option<f64>,
}

impl WirePoint {
    /// `None` when the point has no value (masked acquisition).
    fn into_point(self) -> QueryResult<Option<SeriesPoint>> {
        let date = parse_wire_date(&self.date)?;
        let mean = self
            .mean
            .or(self.mean_ndvi)
            .or(self.mean_value)
            .or(self.ndvi)
            .or(self.value);
        let Some(mean) = mean.or(self.median).or(self.p50) else {
            return Ok(None);
        };

        let mut percentiles: BTreeMap<String, f64> = self
            .percentiles
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect();
        if let Some(p50) = self.p50 {
            percentiles.entry("p50".to_string()).or_insert(p50);
        }

        Ok(Some(SeriesPoint {
            date,
            mean,
            min: self.min.or(self.min_ndvi).or(self.min_value),
            max: self.max.or(self.max_ndvi).or(self.max_value),
            std: self.std.or(self.std_ndvi).or(self.std_value),
            percentiles,
        }))
    }
}

fn normalize_points(points: Vec<WirePoint>) -> QueryResult<Vec<SeriesPoint>> {
    let mut out = Vec::with_capacity(points.len());
    for point in points {
        if let Some(point) = point.into_point()? {
            out.push(point);
        }
    }
    out.sort_by_key(|p| p.date);
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct WireStats {
    statistics: WireStatistics,
    #[serde(default)]
    timeline: Vec<WirePoint>,
    #[serde(default)]
    products_available: u64,
}

/// Normalize `/ndvi/statistics` and `/biopar/stats`.
pub fn stats(body: &Value) -> QueryResult<StatsResult> {
    expect_success(body)?;
    let wire: WireStats = decode(body)?;
    Ok(StatsResult {
        statistics: wire.statistics.into_statistics()?,
        timeline: normalize_points(wire.timeline)?,
        products_available: wire.products_available,
    })
}

#[derive(Debug, Deserialize)]
struct WireBin {
    min: f64,
    max: f64,
    count: u64,
    #[serde(default)]
    pct: f64,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
struct WireHistogram {
    bins: Vec<WireBin>,
    #[serde(default)]
    total: Option<u64>,
}

/// Normalize `/ndvi/hist`.
pub fn histogram(body: &Value) -> QueryResult<Histogram> {
    expect_success(body)?;
    let wire: WireHistogram = decode(body)?;
    let total = wire
        .total
        .unwrap_or_else(|| wire.bins.iter().map(|b| b.count).sum());
    Ok(Histogram {
        bins: wire
            .bins
            .into_iter()
            .map(|b| HistogramBin {
                min: b.min,
                max: b.max,
                count: b.count,
                pct: b.pct,
                label: b.label,
            })
            .collect(),
        total,
    })
}

#[derive(Debug, Deserialize)]
struct WireSeries {
    #[serde(default)]
    series: Vec<WirePoint>,
    #[serde(default)]
    timeline: Option<Vec<WirePoint>>,
}

/// Normalize `/ndvi/timeseries` and `/biopar/timeseries`.
///
/// The detailed BIOPAR timeline is preferred over the bare series when the
/// server provides it.
pub fn series(body: &Value) -> QueryResult<Series> {
    expect_success(body)?;
    let wire: WireSeries = decode(body)?;
    let points = match wire.timeline {
        Some(timeline) if !timeline.is_empty() => timeline,
        _ => wire.series,
    };
    Ok(Series {
        points: normalize_points(points)?,
    })
}

#[derive(Debug, Deserialize)]
struct WireGeoTiff {
    tiff_url: String,
    #[serde(default)]
    filename: Option<String>,
}

/// Normalize `/ndvi/geotiff` and `/biopar/geotiff`.
pub fn geotiff(body: &Value) -> QueryResult<GeoTiffRef> {
    expect_success(body)?;
    let wire: WireGeoTiff = decode(body)?;
    if wire.tiff_url.trim().is_empty() {
        return Err(QueryError::InvalidResponse("empty tiff_url".to_string()));
    }
    let filename = wire.filename.unwrap_or_else(|| {
        wire.tiff_url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    });
    Ok(GeoTiffRef {
        tiff_url: wire.tiff_url,
        filename,
    })
}

#[derive(Debug, Deserialize)]
struct WireReport {
    report: Value,
    date: String,
}

/// Normalize `/ndvi/report` and `/biopar/report`.
pub fn report(body: &Value) -> QueryResult<Report> {
    expect_success(body)?;
    let wire: WireReport = decode(body)?;
    if !wire.report.is_object() {
        return Err(QueryError::InvalidResponse(
            "report is not an object".to_string(),
        ));
    }
    let summary = wire
        .report
        .pointer("/vegetation_status/overall")
        .or_else(|| wire.report.pointer("/vegetation_status/description"))
        .or_else(|| wire.report.get("summary"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(Report {
        date: parse_wire_date(&wire.date)?,
        summary,
        payload: wire.report,
    })
}

#[derive(Debug, Deserialize)]
struct WireCategory {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireGeometry {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    coordinates: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    categories: Vec<WireCategory>,
    #[serde(default)]
    geometry: Vec<WireGeometry>,
    #[serde(default)]
    closed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePagination {
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireEvents {
    events: Vec<WireEvent>,
    #[serde(default)]
    pagination: Option<WirePagination>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    cached: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn point_location(geometry: &[WireGeometry]) -> Option<(f64, f64)> {
    geometry
        .iter()
        .filter(|g| g.kind.as_deref() == Some("Point"))
        .find_map(|g| {
            let coords = g.coordinates.as_ref()?.as_array()?;
            let lng = coords.first()?.as_f64()?;
            let lat = coords.get(1)?.as_f64()?;
            Some((lat, lng))
        })
}

/// Normalize `/events`.
///
/// This endpoint has no `status` field; an upstream failure is reported in
/// `error` next to an empty event list.
pub fn events(body: &Value) -> QueryResult<EventFeed> {
    let wire: WireEvents = decode(body)?;
    let returned = wire.events.len() as u64;
    let events = wire
        .events
        .into_iter()
        .map(|e| {
            let id = match e.id {
                Value::String(s) => s,
                other => other.to_string(),
            };
            let categories = e
                .categories
                .into_iter()
                .filter_map(|c| {
                    c.title.or_else(|| match c.id {
                        Some(Value::String(s)) => Some(s),
                        Some(other) => Some(other.to_string()),
                        None => None,
                    })
                })
                .collect();
            let location = point_location(&e.geometry);
            EventSummary {
                id,
                title: non_empty(e.title).unwrap_or_else(|| "Untitled Event".to_string()),
                description: non_empty(e.description),
                link: non_empty(e.link),
                categories,
                closed: non_empty(e.closed),
                location,
            }
        })
        .collect();

    Ok(EventFeed {
        events,
        total: wire
            .pagination
            .and_then(|p| p.total)
            .unwrap_or(returned),
        cached: wire.cached,
        upstream_error: non_empty(wire.error),
    })
}

/// Normalize `/health`.
///
/// Accepts both `{status: "healthy", checks: {name: {status}}}` and flat
/// `{ok, <dependency>_ok}` booleans.
pub fn health(body: &Value) -> QueryResult<HealthReport> {
    let object = body
        .as_object()
        .ok_or_else(|| QueryError::InvalidResponse("health is not an object".to_string()))?;

    let mut checks = BTreeMap::new();
    if let Some(Value::Object(named)) = object.get("checks") {
        for (name, check) in named {
            let status = check.get("status").and_then(Value::as_str).unwrap_or("");
            checks.insert(
                name.clone(),
                matches!(status, "healthy" | "ok" | "not_configured"),
            );
        }
    }
    for (name, value) in object {
        if let (Some(dependency), Some(flag)) = (name.strip_suffix("_ok"), value.as_bool()) {
            checks.insert(dependency.to_string(), flag);
        }
    }

    let ok = match (object.get("ok"), object.get("status").and_then(Value::as_str)) {
        (Some(Value::Bool(ok)), _) => *ok,
        (_, Some(status)) => matches!(status, "healthy" | "ok" | "success"),
        _ => {
            return Err(QueryError::InvalidResponse(
                "health has neither ok nor status".to_string(),
            ))
        }
    };

    Ok(HealthReport { ok, checks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_status_must_be_success() {
        assert!(expect_success(&json!({"status": "success"})).is_ok());
        assert!(matches!(
            expect_success(&json!({"bins": []})),
            Err(QueryError::InvalidResponse(_))
        ));
        assert!(matches!(
            expect_success(&json!({"status": "pending"})),
            Err(QueryError::InvalidResponse(_))
        ));
        assert!(expect_success(&json!({"status": "error", "message": "No Sentinel products"}))
            .unwrap_err()
            .is_no_data());
    }

    #[test]
    fn test_ndvi_stats() {
        let body = json!({
            "status": "success",
            "statistics": {
                "mean_ndvi": 0.65, "min_ndvi": 0.2, "max_ndvi": 0.9,
                "std_ndvi": 0.15, "median_ndvi": 0.64, "total_observations": 24,
                "trend": {"direction": "increasing"}
            },
            "timeline": [
                {"date": "2024-06-11", "mean_ndvi": 0.7},
                {"date": "2024-06-01", "mean_ndvi": 0.62, "min_ndvi": 0.3, "max_ndvi": 0.85,
                 "std_ndvi": 0.15, "percentiles": {"p10": 0.35, "p90": 0.82, "p99": null}}
            ],
            "products_available": 15,
            "bbox": [69.0, 51.0, 73.0, 53.0]
        });

        let result = stats(&body).unwrap();
        assert_eq!(result.statistics.mean, 0.65);
        assert_eq!(result.statistics.observations, Some(24));
        assert_eq!(result.products_available, 15);
        assert_eq!(result.timeline.len(), 2);
        assert_eq!(result.timeline[0].date, date("2024-06-01"));
        assert_eq!(result.timeline[0].min, Some(0.3));
        assert_eq!(result.timeline[0].percentiles.len(), 2);
        assert_eq!(result.timeline[1].mean, 0.7);
    }

    #[test]
    fn test_biopar_stats() {
        let body = json!({
            "status": "success",
            "statistics": {"mean": 0.72, "min": 0.35, "max": 0.95, "std": 0.18},
            "timeline": [{"date": "2024-06-01", "mean_value": 0.70, "min_value": 0.40}],
            "biopar_type": "FAPAR",
            "products_available": 12
        });

        let result = stats(&body).unwrap();
        assert_eq!(result.statistics.mean, 0.72);
        assert_eq!(result.statistics.median, None);
        assert_eq!(result.timeline[0].mean, 0.70);
        assert_eq!(result.timeline[0].min, Some(0.40));
    }

    #[test]
    fn test_biopar_points_with_both_spellings() {
        let point = json!({
            "date": "2024-06-01",
            "mean_value": 0.7012, "min_value": 0.41, "max_value": 0.93, "std_value": 0.12,
            "mean": 0.7012, "min": 0.41, "max": 0.93, "std": 0.12,
            "p50": 0.70, "median": 0.70
        });
        let body = json!({
            "status": "success",
            "biopar_type": "LAI",
            "statistics": {
                "mean": 0.7012, "median": 0.70, "std": 0.0, "min": 0.7012, "max": 0.7012
            },
            "timeline": [point.clone()],
            "trend": {"direction": "stable"},
            "products_available": 1
        });

        let result = stats(&body).unwrap();
        assert_eq!(result.statistics.median, Some(0.70));
        assert_eq!(result.timeline.len(), 1);
        assert_eq!(result.timeline[0].mean, 0.7012);
        assert_eq!(result.timeline[0].max, Some(0.93));
        assert_eq!(result.timeline[0].std, Some(0.12));
        assert_eq!(result.timeline[0].percentiles.get("p50"), Some(&0.70));

        let body = json!({"status": "success", "series": [], "timeline": [point]});
        let series = series(&body).unwrap();
        assert_eq!(series.points[0].min, Some(0.41));
    }

    #[test]
    fn test_stats_missing_fields_is_invalid() {
        let body = json!({"status": "success", "timeline": []});
        assert!(matches!(stats(&body), Err(QueryError::InvalidResponse(_))));
    }

    #[test]
    fn test_histogram() {
        let body = json!({
            "status": "success",
            "bins": [
                {"min": -1.0, "max": 0.0, "count": 150, "pct": 5.2, "label": "Water/Bare Soil"},
                {"min": 0.0, "max": 1.0, "count": 2730, "pct": 94.8, "label": "Vegetation"}
            ],
            "total": 2880
        });
        let hist = histogram(&body).unwrap();
        assert_eq!(hist.bins.len(), 2);
        assert_eq!(hist.total, 2880);
        assert_eq!(hist.bins[0].label, "Water/Bare Soil");
    }

    #[test]
    fn test_ndvi_series() {
        let body = json!({
            "status": "success",
            "series": [
                {"date": "2024-06-20", "ndvi": 0.5},
                {"date": "2024-06-05", "ndvi": 0.4}
            ],
            "location": {"lon": 71.5, "lat": 51.5}
        });
        let series = series(&body).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].date, date("2024-06-05"));
        assert_eq!(series.points[0].mean, 0.4);
    }

    #[test]
    fn test_biopar_series_prefers_timeline() {
        let body = json!({
            "status": "success",
            "series": [{"date": "2024-06-01", "value": 0.6, "aggregation_window": 10}],
            "timeline": [
                {
                    "date": "2024-06-01",
                    "mean": 0.61, "min": 0.4, "max": 0.8, "std": 0.1, "p50": 0.6
                },
                {"date": "2024-06-11", "mean": null, "median": 0.65}
            ]
        });
        let series = series(&body).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].mean, 0.61);
        assert_eq!(series.points[0].percentiles.get("p50"), Some(&0.6));
        assert_eq!(series.points[1].mean, 0.65);
    }

    #[test]
    fn test_series_skips_masked_points() {
        let body = json!({
            "status": "success",
            "series": [{"date": "2024-06-01", "value": null}, {"date": "2024-06-02", "value": 0.3}]
        });
        assert_eq!(series(&body).unwrap().len(), 1);
    }

    #[test]
    fn test_series_bad_date_is_invalid() {
        let body = json!({"status": "success", "series": [{"date": "June 1", "ndvi": 0.3}]});
        assert!(matches!(series(&body), Err(QueryError::InvalidResponse(_))));
    }

    #[test]
    fn test_geotiff() {
        let body = json!({
            "status": "success",
            "tiff_url": "http://localhost:8000/static/ndvi/ndvi_69_51.tif",
            "filename": "ndvi_69_51.tif"
        });
        let tiff = geotiff(&body).unwrap();
        assert_eq!(tiff.filename, "ndvi_69_51.tif");

        let body = json!({"status": "success", "tiff_url": "http://h/x/a.tif"});
        assert_eq!(geotiff(&body).unwrap().filename, "a.tif");

        let body = json!({"status": "success", "tiff_url": ""});
        assert!(geotiff(&body).is_err());
    }

    #[test]
    fn test_report() {
        let body = json!({
            "status": "success",
            "report": {"vegetation_status": {"overall": "Optimal", "description": "Healthy"}},
            "date": "2024-06-30"
        });
        let report = report(&body).unwrap();
        assert_eq!(report.date, date("2024-06-30"));
        assert_eq!(report.summary.as_deref(), Some("Optimal"));
    }

    #[test]
    fn test_events() {
        let body = json!({
            "events": [{
                "id": "EONET_123",
                "title": "Wildfire near Astana",
                "description": "",
                "link": "https://eonet.gsfc.nasa.gov/api/v3/events/EONET_123",
                "categories": [{"id": "wildfires", "title": "Wildfires"}],
                "geometry": [{"type": "Point", "coordinates": [71.4, 51.2], "date": "2024-06-01"}],
                "sources": [],
                "closed": null
            }],
            "stats": {"total": 10, "in_region": 1},
            "pagination": {"total": 1, "limit": 100, "offset": 0, "returned": 1},
            "cached": true
        });
        let feed = events(&body).unwrap();
        assert_eq!(feed.total, 1);
        assert!(feed.cached);
        assert_eq!(feed.events[0].categories, vec!["Wildfires".to_string()]);
        assert_eq!(feed.events[0].description, None);
        assert_eq!(feed.events[0].location, Some((51.2, 71.4)));
        assert!(feed.events[0].is_open());
    }

    #[test]
    fn test_events_upstream_error() {
        let body = json!({
            "events": [],
            "pagination": {"total": 0},
            "error": "bad_json",
            "cached": false
        });
        let feed = events(&body).unwrap();
        assert!(feed.events.is_empty());
        assert_eq!(feed.upstream_error.as_deref(), Some("bad_json"));
    }

    #[test]
    fn test_health_nested_checks() {
        let body = json!({
            "status": "degraded",
            "checks": {
                "titiler": {"status": "healthy"},
                "sentinel_hub": {"status": "unhealthy"},
                "disk": {"status": "ok"}
            }
        });
        let report = health(&body).unwrap();
        assert!(!report.ok);
        assert_eq!(report.checks.get("titiler"), Some(&true));
        assert_eq!(report.checks.get("sentinel_hub"), Some(&false));
        assert_eq!(report.checks.get("disk"), Some(&true));
    }

    #[test]
    fn test_health_flat_flags() {
        let body = json!({"ok": true, "titiler_ok": true, "sentinel_ok": false});
        let report = health(&body).unwrap();
        assert!(report.ok);
        assert_eq!(report.checks.get("sentinel"), Some(&false));
        assert!(health(&json!({})).is_err());
    }
}
