//! Pin collection with quota-resilient persistence.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{QueryError, QueryResult};
use crate::query::{DateRange, Product, QueryClient, Series, TimeseriesQuery};

use super::model::{NewPin, Pin};
use super::storage::{PinStorage, StorageError};

/// Namespace prefix for pin storage keys.
pub const STORAGE_KEY_PREFIX: &str = "agrowatch:pins";

/// Storage key for a pin stream, e.g. `agrowatch:pins:ndvi`.
pub fn storage_key(stream: &str) -> String {
    format!("{}:{}", STORAGE_KEY_PREFIX, stream)
}

/// Errors from pin operations.
#[derive(Debug, Error)]
pub enum PinError {
    /// Rejected before anything was changed or written.
    #[error("Invalid pin: {0}")]
    Validation(#[from] QueryError),

    #[error("No pin at index {index} (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The change is applied in memory but could not be persisted.
    #[error("Failed to save pins: {0}")]
    Persist(#[source] StorageError),
}

/// Result of plotting a pin's time series.
#[derive(Debug, Clone, PartialEq)]
pub enum PinSeries {
    Series(Series),
    /// Nothing to plot; `message` is the empty-state text.
    Empty { message: String },
}

/// An ordered, persisted list of pins for one stream.
pub struct PinStore {
    key: String,
    storage: Arc<dyn PinStorage>,
    pins: Mutex<Vec<Pin>>,
}

impl std::fmt::Debug for PinStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinStore")
            .field("key", &self.key)
            .field("len", &self.len())
            .finish()
    }
}

impl PinStore {
    /// Open the collection for `stream`, loading whatever is persisted.
    ///
    /// Unreadable or corrupt persisted state is logged and replaced with an
    /// empty list; it will be overwritten on the next change.
    pub fn open(stream: &str, storage: Arc<dyn PinStorage>) -> Self {
        let key = storage_key(stream);
        let pins = match storage.load(&key) {
            Ok(Some(json)) => match serde_json::from_str::<Vec<Pin>>(&json) {
                Ok(pins) => pins,
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding corrupt pin data");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to load pins");
                Vec::new()
            }
        };
        debug!(key = %key, count = pins.len(), "Opened pin store");

        Self {
            key,
            storage,
            pins: Mutex::new(pins),
        }
    }

    /// Storage key of this collection.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Snapshot of the pins in insertion order.
    pub fn list(&self) -> Vec<Pin> {
        self.pins.lock().clone()
    }

    pub fn get(&self, index: usize) -> Option<Pin> {
        self.pins.lock().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.pins.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate and append a pin, then persist the list.
    ///
    /// Invalid coordinates are rejected before any write. When persisting
    /// fails the pin is still kept in memory and [`PinError::Persist`] is
    /// returned.
    pub fn add(&self, pin: NewPin) -> Result<Pin, PinError> {
        pin.validate()?;
        let pin = pin.into_pin(Utc::now());

        let mut pins = self.pins.lock();
        pins.push(pin.clone());
        info!(key = %self.key, name = %pin.name, lat = pin.lat, lng = pin.lng, "Pin added");
        self.persist(&pins)?;
        Ok(pin)
    }

    /// Remove the pin at `index` and persist.
    pub fn remove(&self, index: usize) -> Result<Pin, PinError> {
        let mut pins = self.pins.lock();
        if index >= pins.len() {
            return Err(PinError::IndexOutOfRange {
                index,
                len: pins.len(),
            });
        }
        let removed = pins.remove(index);
        info!(key = %self.key, name = %removed.name, "Pin removed");
        self.persist(&pins)?;
        Ok(removed)
    }

    /// Remove every pin and persist.
    pub fn clear(&self) -> Result<(), PinError> {
        let mut pins = self.pins.lock();
        pins.clear();
        info!(key = %self.key, "Pins cleared");
        self.persist(&pins)
    }

    /// Fetch the time series at the pin at `index`.
    ///
    /// A no-data answer (or an empty series) becomes [`PinSeries::Empty`] with
    /// the empty-state message; every other failure is returned as an error.
    /// An unknown index is a validation error and sends nothing.
    pub async fn plot_series(
        &self,
        client: &QueryClient,
        index: usize,
        product: Product,
        range: DateRange,
    ) -> QueryResult<PinSeries> {
        let pin = self.get(index).ok_or_else(|| {
            QueryError::validation(format!("no pin at index {} (have {})", index, self.len()))
        })?;

        let query = TimeseriesQuery::new(product, pin.lat, pin.lng, range);
        match client.timeseries(&query).await {
            Ok(series) if series.is_empty() => Ok(PinSeries::Empty {
                message: format!("No observations near {} for {}.", pin.name, range),
            }),
            Ok(series) => Ok(PinSeries::Series(series)),
            Err(QueryError::NoData { message }) => Ok(PinSeries::Empty { message }),
            Err(e) => Err(e),
        }
    }

    /// Write the full list. On a quota error the persisted entry is removed
    /// once and the write retried.
    fn persist(&self, pins: &[Pin]) -> Result<(), PinError> {
        let json = serde_json::to_string(pins)
            .map_err(|e| PinError::Persist(StorageError::Serialization(e)))?;

        match self.storage.save(&self.key, &json) {
            Ok(()) => Ok(()),
            Err(e) if e.is_quota_exceeded() => {
                warn!(key = %self.key, error = %e, "Pin storage full, clearing and retrying");
                if let Err(e) = self.storage.remove(&self.key) {
                    warn!(key = %self.key, error = %e, "Failed to clear pin storage");
                }
                self.storage.save(&self.key, &json).map_err(|e| {
                    warn!(key = %self.key, error = %e, "Pins kept in memory only");
                    PinError::Persist(e)
                })
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Pins kept in memory only");
                Err(PinError::Persist(e))
            }
        }
    }
}
