//! AgroWatch CLI - command-line interface to the vegetation monitoring API.

mod commands;
mod error;
mod runner;

use std::path::{Path, PathBuf};

use agrowatch::query::EventStatus;
use clap::{ArgAction, Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use commands::animate::AnimateArgs;
use commands::common::{AreaArgs, BioparArg};
use commands::config::ConfigCommands;
use commands::pins::PinsAction;
use commands::query::{EventsArgs, SeriesArgs};
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(
    name = "agrowatch",
    version,
    about = "Query satellite vegetation indices from an AgroWatch server"
)]
struct Cli {
    /// API base URL (overrides api.base_url)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check server health
    Health,

    /// Area statistics for a date range
    Stats {
        #[command(flatten)]
        area: AreaArgs,
        /// BIOPAR product instead of NDVI
        #[arg(long, value_enum)]
        biopar: Option<BioparArg>,
    },

    /// NDVI class histogram
    Hist {
        #[command(flatten)]
        area: AreaArgs,
        /// Custom bin edges, comma separated
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        bins: Vec<f64>,
    },

    /// Time series at a point
    Series {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
        /// Area containing the point (west,south,east,north)
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,
        /// BIOPAR product instead of NDVI
        #[arg(long, value_enum)]
        biopar: Option<BioparArg>,
        /// Maximum acquisition dates (NDVI)
        #[arg(long)]
        max_dates: Option<u32>,
    },

    /// Render a GeoTIFF export
    Geotiff {
        #[command(flatten)]
        area: AreaArgs,
        /// BIOPAR product instead of NDVI
        #[arg(long, value_enum)]
        biopar: Option<BioparArg>,
    },

    /// Analysis report for a date
    Report {
        /// Bounding box as west,south,east,north
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,
        /// Report date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// BIOPAR product instead of NDVI
        #[arg(long, value_enum)]
        biopar: Option<BioparArg>,
    },

    /// Natural events feed
    Events {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
        /// open, closed or all
        #[arg(long, default_value = "open")]
        status: EventStatus,
        /// Bounding box as west,south,east,north
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,
        /// Maximum events to list
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },

    /// Manage saved pins
    Pins {
        /// Pin collection
        #[arg(long, default_value = "ndvi")]
        stream: String,
        #[command(subcommand)]
        action: PinsAction,
    },

    /// Animate statistics over consecutive date windows
    Animate {
        #[command(flatten)]
        area: AreaArgs,
        /// BIOPAR product instead of NDVI
        #[arg(long, value_enum)]
        biopar: Option<BioparArg>,
        /// Days per frame
        #[arg(long, default_value_t = 10)]
        step_days: u32,
        /// Frames to show (one pass by default)
        #[arg(long)]
        ticks: Option<usize>,
        /// Milliseconds between frames (animation.interval_ms by default)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// View or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn init_logging(log_file: Option<&Path>, verbose: u8) -> Result<Option<WorkerGuard>, CliError> {
    let default = match verbose {
        0 => "agrowatch=warn",
        1 => "agrowatch=info",
        _ => "agrowatch=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path.file_name().ok_or_else(|| {
        CliError::InvalidArgument(format!("'{}' is not a file path", path.display()))
    })?;
    std::fs::create_dir_all(dir)?;

    let file = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

fn run(cli: Cli) -> Result<(), CliError> {
    let json = cli.json;
    let command = match cli.command {
        Commands::Config { command } => return commands::config::run(command),
        other => other,
    };

    let runner = CliRunner::new(cli.api_url)?;

    match command {
        Commands::Health => {
            runner.log_startup("health");
            commands::query::health(&runner, json)
        }
        Commands::Stats { area, biopar } => {
            runner.log_startup("stats");
            commands::query::stats(&runner, &area, biopar, json)
        }
        Commands::Hist { area, bins } => {
            runner.log_startup("hist");
            commands::query::histogram(&runner, &area, bins, json)
        }
        Commands::Series {
            lat,
            lng,
            start,
            end,
            bbox,
            biopar,
            max_dates,
        } => {
            runner.log_startup("series");
            let args = SeriesArgs {
                lat,
                lng,
                start,
                end,
                bbox,
                biopar,
                max_dates,
            };
            commands::query::series(&runner, args, json)
        }
        Commands::Geotiff { area, biopar } => {
            runner.log_startup("geotiff");
            commands::query::geotiff(&runner, &area, biopar, json)
        }
        Commands::Report { bbox, date, biopar } => {
            runner.log_startup("report");
            commands::query::report_for_date(&runner, &bbox, &date, biopar, json)
        }
        Commands::Events {
            start,
            end,
            status,
            bbox,
            limit,
        } => {
            runner.log_startup("events");
            let args = EventsArgs {
                start,
                end,
                status,
                bbox,
                limit,
            };
            commands::query::events(&runner, args, json)
        }
        Commands::Pins { stream, action } => commands::pins::run(&runner, &stream, action),
        Commands::Animate {
            area,
            biopar,
            step_days,
            ticks,
            interval_ms,
        } => {
            runner.log_startup("animate");
            let args = AnimateArgs {
                area,
                biopar,
                step_days,
                ticks,
                interval_ms,
            };
            commands::animate::run(&runner, args)
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn main() {
    let cli = Cli::parse();

    let _guard = match init_logging(cli.log_file.as_deref(), cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
