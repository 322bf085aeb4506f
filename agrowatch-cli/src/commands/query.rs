//! Query commands: one API resource each.

use agrowatch::query::{
    EventStatus, EventsQuery, GeoTiffQuery, HistogramQuery, ReportQuery, StatsQuery,
    TimeseriesQuery,
};
use agrowatch::query::params::parse_date;

use super::common::{fmt_opt, parse_bbox, parse_range, product, report, AreaArgs, BioparArg};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Check server health.
pub fn health(runner: &CliRunner, json: bool) -> Result<(), CliError> {
    let result = runner.block_on(runner.session().client().health());
    report(result, json, |health| {
        println!("Server: {}", if health.ok { "healthy" } else { "degraded" });
        for (name, ok) in &health.checks {
            println!("  {:<12} {}", name, if *ok { "ok" } else { "FAIL" });
        }
    })
}

/// Area statistics.
pub fn stats(
    runner: &CliRunner,
    area: &AreaArgs,
    biopar: Option<BioparArg>,
    json: bool,
) -> Result<(), CliError> {
    let (bbox, range) = area.parse()?;
    let query = StatsQuery::new(product(biopar), bbox, range);
    let result = runner.block_on(runner.session().client().statistics(&query));

    report(result, json, |stats| {
        let s = &stats.statistics;
        println!("{} statistics for {}", query.product.stream(), range);
        println!("  mean    {:.3}", s.mean);
        println!("  min     {}", fmt_opt(s.min));
        println!("  max     {}", fmt_opt(s.max));
        println!("  std     {}", fmt_opt(s.std));
        println!("  median  {}", fmt_opt(s.median));
        println!("  scenes  {}", stats.products_available);
        for point in &stats.timeline {
            println!("  {}  {:.3}", point.date, point.mean);
        }
    })
}

/// NDVI class histogram.
pub fn histogram(
    runner: &CliRunner,
    area: &AreaArgs,
    bins: Vec<f64>,
    json: bool,
) -> Result<(), CliError> {
    let (bbox, range) = area.parse()?;
    let mut query = HistogramQuery::new(bbox, range);
    if !bins.is_empty() {
        query = query.with_bins(bins);
    }
    let result = runner.block_on(runner.session().client().histogram(&query));

    report(result, json, |hist| {
        println!("NDVI histogram for {} ({} pixels)", range, hist.total);
        for bin in &hist.bins {
            println!(
                "  [{:>5.2}, {:>5.2})  {:>6.2}%  {}",
                bin.min, bin.max, bin.pct, bin.label
            );
        }
    })
}

/// Arguments for the series command.
pub struct SeriesArgs {
    pub lat: f64,
    pub lng: f64,
    pub start: String,
    pub end: String,
    pub bbox: Option<String>,
    pub biopar: Option<BioparArg>,
    pub max_dates: Option<u32>,
}

/// Time series at a point.
pub fn series(runner: &CliRunner, args: SeriesArgs, json: bool) -> Result<(), CliError> {
    let range = parse_range(&args.start, &args.end)?;
    let mut query = TimeseriesQuery::new(product(args.biopar), args.lat, args.lng, range);
    if let Some(bbox) = &args.bbox {
        query = query.with_bbox(parse_bbox(bbox)?);
    }
    if let Some(max_dates) = args.max_dates {
        query = query.with_max_dates(max_dates);
    }
    let result = runner.block_on(runner.session().client().timeseries(&query));

    report(result, json, |series| {
        println!(
            "{} series at {:.4}, {:.4} ({} points)",
            query.product.stream(),
            args.lat,
            args.lng,
            series.len()
        );
        for point in &series.points {
            println!(
                "  {}  {:.3}  (min {}, max {})",
                point.date,
                point.mean,
                fmt_opt(point.min),
                fmt_opt(point.max)
            );
        }
    })
}

/// Request a GeoTIFF export.
pub fn geotiff(
    runner: &CliRunner,
    area: &AreaArgs,
    biopar: Option<BioparArg>,
    json: bool,
) -> Result<(), CliError> {
    let (bbox, range) = area.parse()?;
    let query = GeoTiffQuery::new(product(biopar), bbox, range);
    println!("Rendering GeoTIFF, this can take a few minutes...");
    let result = runner.block_on(runner.session().client().geotiff(&query));

    report(result, json, |tiff| {
        println!("{}", tiff.filename);
        println!("  {}", tiff.tiff_url);
    })
}

/// Analysis report for a date.
pub fn report_for_date(
    runner: &CliRunner,
    bbox: &str,
    date: &str,
    biopar: Option<BioparArg>,
    json: bool,
) -> Result<(), CliError> {
    let query = ReportQuery::new(product(biopar), parse_bbox(bbox)?, parse_date(date)?);
    let result = runner.block_on(runner.session().client().report(&query));

    report(result, json, |report| {
        println!("Report for {}", report.date);
        match &report.summary {
            Some(summary) => println!("  {}", summary),
            None => println!("  (no summary)"),
        }
    })
}

/// Arguments for the events command.
pub struct EventsArgs {
    pub start: Option<String>,
    pub end: Option<String>,
    pub status: EventStatus,
    pub bbox: Option<String>,
    pub limit: u32,
}

/// Natural events feed.
pub fn events(runner: &CliRunner, args: EventsArgs, json: bool) -> Result<(), CliError> {
    let mut query = EventsQuery::new()
        .with_status(args.status)
        .with_page(args.limit, 0);
    match (&args.start, &args.end) {
        (Some(start), Some(end)) => query = query.with_range(parse_range(start, end)?),
        (None, None) => {}
        _ => {
            return Err(CliError::InvalidArgument(
                "--start and --end must be given together".to_string(),
            ))
        }
    }
    if let Some(bbox) = &args.bbox {
        query = query.with_bbox(parse_bbox(bbox)?);
    }

    let result = runner
        .block_on(runner.session().events().load(&query))
        .ok_or_else(|| CliError::Query("Event request was superseded".to_string()))?;

    report(result, json, |feed| {
        if let Some(error) = &feed.upstream_error {
            println!("Warning: event source reported: {}", error);
        }
        println!(
            "{} of {} events{}",
            feed.events.len(),
            feed.total,
            if feed.cached { " (cached)" } else { "" }
        );
        for event in &feed.events {
            let location = event
                .location
                .map(|(lat, lng)| format!("{:.2}, {:.2}", lat, lng))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  [{}] {}  {}  ({})",
                if event.is_open() { "open" } else { "closed" },
                event.title,
                location,
                event.categories.join(", ")
            );
        }
    })
}
