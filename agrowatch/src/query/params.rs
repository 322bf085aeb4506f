//! Query parameters and their validation.
//!
//! Everything here is checked before any network call; failures are
//! [`QueryError::Validation`].

use std::fmt;
use std::str::FromStr;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Largest bounding box the API accepts, in square degrees.
pub const MAX_BBOX_AREA_SQ_DEG: f64 = 100.0;

/// Longest date range the API accepts, in days.
pub const MAX_RANGE_DAYS: i64 = 365;

/// Date format used on the wire.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// First day with Sentinel-2 imagery.
pub fn earliest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 6, 23).unwrap_or(NaiveDate::MIN)
}

/// Check a latitude/longitude pair.
pub fn validate_coordinates(lat: f64, lng: f64) -> QueryResult<()> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(QueryError::validation(format!(
            "latitude {} is outside [-90, 90]",
            lat
        )));
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(QueryError::validation(format!(
            "longitude {} is outside [-180, 180]",
            lng
        )));
    }
    Ok(())
}

/// Rectangular extent in EPSG:4326 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Build and validate a bounding box.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> QueryResult<Self> {
        let bbox = Self {
            west,
            south,
            east,
            north,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Square box of `half_size` degrees around a point, clamped to the globe.
    pub fn around(lat: f64, lng: f64, half_size: f64) -> QueryResult<Self> {
        validate_coordinates(lat, lng)?;
        Self::new(
            (lng - half_size).max(-180.0),
            (lat - half_size).max(-90.0),
            (lng + half_size).min(180.0),
            (lat + half_size).min(90.0),
        )
    }

    /// Check ranges, ordering and area.
    pub fn validate(&self) -> QueryResult<()> {
        let values = [self.west, self.south, self.east, self.north];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(QueryError::validation("bbox values must be finite numbers"));
        }
        if !(-180.0..=180.0).contains(&self.west) || !(-180.0..=180.0).contains(&self.east) {
            return Err(QueryError::validation(
                "bbox longitudes must be within [-180, 180]",
            ));
        }
        if !(-90.0..=90.0).contains(&self.south) || !(-90.0..=90.0).contains(&self.north) {
            return Err(QueryError::validation(
                "bbox latitudes must be within [-90, 90]",
            ));
        }
        if self.west >= self.east {
            return Err(QueryError::validation("bbox west must be less than east"));
        }
        if self.south >= self.north {
            return Err(QueryError::validation("bbox south must be less than north"));
        }
        let area = self.area();
        if area > MAX_BBOX_AREA_SQ_DEG {
            return Err(QueryError::validation(format!(
                "bbox area {:.1} sq deg exceeds the {} sq deg limit",
                area, MAX_BBOX_AREA_SQ_DEG
            )));
        }
        Ok(())
    }

    /// Area in square degrees.
    pub fn area(&self) -> f64 {
        (self.east - self.west) * (self.north - self.south)
    }

    /// Whether the point lies inside the box (edges included).
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.west..=self.east).contains(&lng) && (self.south..=self.north).contains(&lat)
    }

    /// Center as `(lat, lng)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }
}

/// Canonical `west,south,east,north` form.
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

impl FromStr for BoundingBox {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| QueryError::validation("bbox must be 'west,south,east,north'"))?;

        match parts.as_slice() {
            [west, south, east, north] => Self::new(*west, *south, *east, *north),
            _ => Err(QueryError::validation("bbox must have exactly 4 values")),
        }
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> QueryResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        QueryError::validation(format!("'{}' is not a valid YYYY-MM-DD date", value))
    })
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build and validate a range.
    pub fn new(start: NaiveDate, end: NaiveDate) -> QueryResult<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Parse and validate a range from `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> QueryResult<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// The `days` days ending at `end`.
    pub fn ending(end: NaiveDate, days: i64) -> QueryResult<Self> {
        Self::new(end - ChronoDuration::days(days.max(0)), end)
    }

    /// Check ordering, span and the imagery window.
    pub fn validate(&self) -> QueryResult<()> {
        if self.start > self.end {
            return Err(QueryError::validation(format!(
                "start date {} is after end date {}",
                self.start, self.end
            )));
        }
        if self.days() > MAX_RANGE_DAYS {
            return Err(QueryError::validation(format!(
                "date range of {} days exceeds the {} day limit",
                self.days(),
                MAX_RANGE_DAYS
            )));
        }
        validate_date(self.start)?;
        validate_date(self.end)
    }

    /// Days between start and end.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Start in wire format.
    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    /// End in wire format.
    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start_str(), self.end_str())
    }
}

/// Check a single date against the imagery window.
pub fn validate_date(date: NaiveDate) -> QueryResult<()> {
    if date < earliest_date() {
        return Err(QueryError::validation(format!(
            "date {} is before Sentinel-2 imagery begins ({})",
            date,
            earliest_date()
        )));
    }
    if date > Utc::now().date_naive() {
        return Err(QueryError::validation(format!(
            "date {} is in the future",
            date
        )));
    }
    Ok(())
}

/// Biophysical parameter computed from Sentinel-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum BioparType {
    /// Fraction of absorbed photosynthetically active radiation.
    #[default]
    Fapar,
    /// Leaf area index.
    Lai,
    /// Fraction of vegetation cover.
    Fcover,
    /// Canopy chlorophyll content.
    Ccc,
    /// Canopy water content.
    Cwc,
}

impl BioparType {
    /// All parameter types.
    pub const ALL: [BioparType; 5] = [
        BioparType::Fapar,
        BioparType::Lai,
        BioparType::Fcover,
        BioparType::Ccc,
        BioparType::Cwc,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BioparType::Fapar => "FAPAR",
            BioparType::Lai => "LAI",
            BioparType::Fcover => "FCOVER",
            BioparType::Ccc => "CCC",
            BioparType::Cwc => "CWC",
        }
    }
}

impl fmt::Display for BioparType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BioparType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BioparType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                QueryError::validation(format!(
                    "unknown BIOPAR type '{}', expected one of FAPAR, LAI, FCOVER, CCC, CWC",
                    s
                ))
            })
    }
}

/// Vegetation product a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Product {
    #[default]
    Ndvi,
    Biopar(BioparType),
}

impl Product {
    /// Endpoint prefix (`ndvi` or `biopar`).
    pub fn prefix(&self) -> &'static str {
        match self {
            Product::Ndvi => "ndvi",
            Product::Biopar(_) => "biopar",
        }
    }

    /// Stream name used for pin collections.
    pub fn stream(&self) -> &'static str {
        self.prefix()
    }

    /// The BIOPAR type, if any.
    pub fn biopar_type(&self) -> Option<BioparType> {
        match self {
            Product::Ndvi => None,
            Product::Biopar(t) => Some(*t),
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Product::Ndvi => f.write_str("NDVI"),
            Product::Biopar(t) => write!(f, "BIOPAR {}", t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bbox_canonical_form() {
        let bbox = BoundingBox::new(71.0, 51.0, 72.0, 52.0).unwrap();
        assert_eq!(bbox.to_string(), "71,51,72,52");

        let bbox = BoundingBox::new(69.5, 51.25, 73.0, 53.0).unwrap();
        assert_eq!(bbox.to_string(), "69.5,51.25,73,53");
    }

    #[test]
    fn test_bbox_rejects_bad_ordering() {
        assert!(BoundingBox::new(72.0, 51.0, 71.0, 52.0).is_err());
        assert!(BoundingBox::new(71.0, 52.0, 72.0, 51.0).is_err());
        assert!(BoundingBox::new(71.0, 51.0, 71.0, 52.0).is_err());
    }

    #[test]
    fn test_bbox_rejects_out_of_range() {
        assert!(BoundingBox::new(-181.0, 0.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::new(0.0, -91.0, 1.0, 0.0).is_err());
        assert!(BoundingBox::new(0.0, 0.0, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_bbox_rejects_large_area() {
        let err = BoundingBox::new(60.0, 40.0, 80.0, 60.0).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
        assert!(BoundingBox::new(60.0, 40.0, 70.0, 50.0).is_ok());
    }

    #[test]
    fn test_bbox_parse() {
        let bbox: BoundingBox = "71, 51, 72, 52".parse().unwrap();
        assert_eq!(bbox, BoundingBox::new(71.0, 51.0, 72.0, 52.0).unwrap());
        assert!("71,51,72".parse::<BoundingBox>().is_err());
        assert!("a,b,c,d".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn test_bbox_around_point() {
        let bbox = BoundingBox::around(51.5, 71.5, 0.01).unwrap();
        assert!(bbox.contains(51.5, 71.5));
        assert!(bbox.area() < 0.001);

        let edge = BoundingBox::around(90.0, 180.0, 0.5).unwrap();
        assert_eq!(edge.north, 90.0);
        assert_eq!(edge.east, 180.0);

        assert!(BoundingBox::around(95.0, 10.0, 0.1).is_err());
    }

    #[test]
    fn test_date_range_valid() {
        let range = DateRange::parse("2024-06-01", "2024-06-30").unwrap();
        assert_eq!(range.days(), 29);
        assert_eq!(range.start_str(), "2024-06-01");
        assert_eq!(range.to_string(), "2024-06-01 to 2024-06-30");
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        assert!(DateRange::new(date(2024, 6, 30), date(2024, 6, 1)).is_err());
    }

    #[test]
    fn test_date_range_rejects_long_span() {
        assert!(DateRange::new(date(2022, 1, 1), date(2023, 6, 1)).is_err());
        assert!(DateRange::new(date(2023, 1, 1), date(2024, 1, 1)).is_ok());
    }

    #[test]
    fn test_date_range_rejects_pre_sentinel() {
        assert!(DateRange::new(date(2015, 1, 1), date(2015, 7, 1)).is_err());
        assert!(DateRange::new(date(2015, 6, 23), date(2015, 7, 1)).is_ok());
    }

    #[test]
    fn test_date_range_rejects_future() {
        let tomorrow = Utc::now().date_naive() + ChronoDuration::days(1);
        assert!(DateRange::new(tomorrow, tomorrow).is_err());
    }

    #[test]
    fn test_malformed_date() {
        assert!(matches!(
            DateRange::parse("2024/06/01", "2024-06-30"),
            Err(QueryError::Validation(_))
        ));
    }

    #[test]
    fn test_biopar_type_parse() {
        assert_eq!("lai".parse::<BioparType>().unwrap(), BioparType::Lai);
        assert_eq!("FCOVER".parse::<BioparType>().unwrap(), BioparType::Fcover);
        assert!("NDWI".parse::<BioparType>().is_err());
        assert_eq!(BioparType::Ccc.to_string(), "CCC");
    }

    #[test]
    fn test_coordinates() {
        assert!(validate_coordinates(51.0, 71.0).is_ok());
        assert!(validate_coordinates(95.0, 10.0).is_err());
        assert!(validate_coordinates(10.0, -181.0).is_err());
    }

    proptest! {
        #[test]
        fn prop_bbox_canonical_form_round_trips(
            west in -179.0f64..170.0,
            south in -89.0f64..80.0,
            width in 0.001f64..9.0,
            height in 0.001f64..9.0,
        ) {
            let bbox = BoundingBox::new(west, south, west + width, south + height).unwrap();
            let text = bbox.to_string();
            let reparsed: BoundingBox = text.parse().unwrap();
            prop_assert_eq!(reparsed, bbox);
            prop_assert_eq!(reparsed.to_string(), text);
        }
    }
}
