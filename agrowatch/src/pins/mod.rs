//! Saved points of interest.
//!
//! Each stream (`ndvi`, `biopar-lai`, ...) has its own [`PinStore`] persisted
//! as one JSON array under `agrowatch:pins:<stream>`.

mod model;
mod storage;
mod store;

pub use model::{NewPin, Pin};
pub use storage::{FileStorage, MemoryStorage, PinStorage, StorageError, DEFAULT_QUOTA_BYTES};
pub use store::{storage_key, PinError, PinSeries, PinStore, STORAGE_KEY_PREFIX};
