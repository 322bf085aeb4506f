//! Argument types and output helpers shared across commands.

use agrowatch::query::{BioparType, BoundingBox, DateRange, Product};
use agrowatch::QueryError;
use clap::{Args, ValueEnum};
use serde::Serialize;

use crate::error::CliError;

/// BIOPAR product selection.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum BioparArg {
    /// Fraction of absorbed photosynthetically active radiation
    Fapar,
    /// Leaf area index
    Lai,
    /// Fraction of vegetation cover
    Fcover,
    /// Canopy chlorophyll content
    Ccc,
    /// Canopy water content
    Cwc,
}

impl From<BioparArg> for BioparType {
    fn from(arg: BioparArg) -> Self {
        match arg {
            BioparArg::Fapar => BioparType::Fapar,
            BioparArg::Lai => BioparType::Lai,
            BioparArg::Fcover => BioparType::Fcover,
            BioparArg::Ccc => BioparType::Ccc,
            BioparArg::Cwc => BioparType::Cwc,
        }
    }
}

/// NDVI unless a BIOPAR type is given.
pub fn product(biopar: Option<BioparArg>) -> Product {
    biopar
        .map(|b| Product::Biopar(b.into()))
        .unwrap_or(Product::Ndvi)
}

/// Bounding box plus date range.
#[derive(Debug, Clone, Args)]
pub struct AreaArgs {
    /// Bounding box as west,south,east,north
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: String,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: String,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    pub end: String,
}

impl AreaArgs {
    pub fn parse(&self) -> Result<(BoundingBox, DateRange), CliError> {
        Ok((parse_bbox(&self.bbox)?, parse_range(&self.start, &self.end)?))
    }
}

pub fn parse_bbox(value: &str) -> Result<BoundingBox, CliError> {
    value.parse::<BoundingBox>().map_err(CliError::from)
}

pub fn parse_range(start: &str, end: &str) -> Result<DateRange, CliError> {
    DateRange::parse(start, end).map_err(CliError::from)
}

/// Print a query result as pretty JSON or through `human`.
///
/// A no-data answer prints its empty-state message and is not an error.
pub fn report<T, F>(result: Result<T, QueryError>, json: bool, human: F) -> Result<(), CliError>
where
    T: Serialize,
    F: FnOnce(&T),
{
    match result {
        Ok(value) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                human(&value);
            }
            Ok(())
        }
        Err(QueryError::NoData { message }) => {
            println!("{}", message);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Format an optional number for tables.
pub fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| "-".to_string())
}
