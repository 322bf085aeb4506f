//! Saved pin commands.

use agrowatch::pins::{NewPin, PinSeries};
use clap::Subcommand;

use super::common::{parse_range, product, BioparArg};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Pin subcommands.
#[derive(Debug, Subcommand)]
pub enum PinsAction {
    /// List saved pins
    List,

    /// Save a new pin
    Add {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Display name
        #[arg(long, default_value = "")]
        name: String,
    },

    /// Remove the pin at INDEX (as shown by `pins list`)
    Remove { index: usize },

    /// Remove all pins
    Clear,

    /// Print the time series at the pin at INDEX
    Plot {
        index: usize,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
        /// BIOPAR product instead of NDVI
        #[arg(long, value_enum)]
        biopar: Option<BioparArg>,
    },
}

/// Run a pins subcommand on `stream`.
pub fn run(runner: &CliRunner, stream: &str, action: PinsAction) -> Result<(), CliError> {
    let store = runner.session().pins(stream);

    match action {
        PinsAction::List => {
            let pins = store.list();
            if pins.is_empty() {
                println!("No pins saved for '{}'", stream);
            }
            for (index, pin) in pins.iter().enumerate() {
                println!(
                    "{:>3}  {:<24} {:>9.4} {:>10.4}  {}",
                    index,
                    pin.name,
                    pin.lat,
                    pin.lng,
                    pin.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
        PinsAction::Add { lat, lng, name } => {
            let pin = store.add(NewPin::new(lat, lng, name))?;
            println!("Saved pin '{}' at {:.4}, {:.4}", pin.name, pin.lat, pin.lng);
            Ok(())
        }
        PinsAction::Remove { index } => {
            let pin = store.remove(index)?;
            println!("Removed pin '{}'", pin.name);
            Ok(())
        }
        PinsAction::Clear => {
            store.clear()?;
            println!("Removed all pins for '{}'", stream);
            Ok(())
        }
        PinsAction::Plot {
            index,
            start,
            end,
            biopar,
        } => {
            let pin = store.get(index).ok_or_else(|| {
                CliError::InvalidArgument(format!("no pin at index {}", index))
            })?;
            let range = parse_range(&start, &end)?;
            let client = runner.session().client();
            let plotted =
                runner.block_on(store.plot_series(client, index, product(biopar), range))?;

            match plotted {
                PinSeries::Empty { message } => println!("{}", message),
                PinSeries::Series(series) => {
                    println!("{} ({} points)", pin.name, series.len());
                    for point in &series.points {
                        println!("  {}  {:.3}", point.date, point.mean);
                    }
                }
            }
            Ok(())
        }
    }
}
