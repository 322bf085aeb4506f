//! Pin records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryResult;
use crate::query::params::validate_coordinates;

/// A saved point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: DateTime<Utc>,
}

/// Input for [`PinStore::add`](super::PinStore::add).
#[derive(Debug, Clone, PartialEq)]
pub struct NewPin {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

impl NewPin {
    pub fn new(lat: f64, lng: f64, name: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            name: name.into(),
        }
    }

    /// Check coordinates against WGS84 bounds.
    pub fn validate(&self) -> QueryResult<()> {
        validate_coordinates(self.lat, self.lng)
    }

    /// Display name, falling back to the coordinates when blank.
    pub fn display_name(&self) -> String {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            format!("{:.4}, {:.4}", self.lat, self.lng)
        } else {
            trimmed.to_string()
        }
    }

    pub(crate) fn into_pin(self, created_at: DateTime<Utc>) -> Pin {
        Pin {
            name: self.display_name(),
            lat: self.lat,
            lng: self.lng,
            created_at,
        }
    }
}
