//! Domain query layer.
//!
//! Builds validated, canonical queries for each upstream resource, runs them
//! through the dedup registry and the fetch core, and normalizes responses
//! into plain data structures.
//!
//! # Resources
//!
//! | Query | Endpoint | Output |
//! |-------|----------|--------|
//! | [`StatsQuery`] | `/ndvi/statistics`, `/biopar/stats` | [`StatsResult`] |
//! | [`HistogramQuery`] | `/ndvi/hist` | [`Histogram`] |
//! | [`TimeseriesQuery`] | `/ndvi/timeseries`, `/biopar/timeseries` | [`Series`] |
//! | [`GeoTiffQuery`] | `/ndvi/geotiff`, `/biopar/geotiff` | [`GeoTiffRef`] |
//! | [`ReportQuery`] | `/ndvi/report`, `/biopar/report` | [`Report`] |
//! | [`EventsQuery`] | `/events` | [`EventFeed`] |
//! | [`HealthQuery`] | `/health` | [`HealthReport`] |

mod client;
mod events;
mod key;
mod models;
pub mod params;
mod requests;
mod wire;

pub use client::{QueryClient, DEFAULT_BASE_URL};
pub use events::{EventLoader, EVENTS_STREAM};
pub use key::CanonicalQuery;
pub use models::{
    EventFeed, EventSummary, GeoTiffRef, HealthReport, Histogram, HistogramBin, Report, Series,
    SeriesPoint, Statistics, StatsResult,
};
pub use params::{BioparType, BoundingBox, DateRange, Product};
pub use requests::{
    EventStatus, EventsQuery, GeoTiffQuery, HealthQuery, HistogramQuery, ReportQuery,
    ResourceQuery, StatsQuery, TimeseriesQuery, DEFAULT_AGG_DAYS, DEFAULT_MAX_DATES,
    POINT_BBOX_HALF_SIZE,
};
