//! Key-value persistence for pin collections.
//!
//! Values are JSON strings stored under namespaced keys. Both backends
//! enforce a byte quota that counts the value being replaced: a write
//! stages the new value next to the old one before swapping, so a nearly
//! full store can need its old entry removed before a larger one fits.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`FileStorage`] | One JSON file per key in a directory |
//! | [`MemoryStorage`] | In-process map for tests and ephemeral sessions |

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

/// Default quota for pin storage.
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The write would exceed the backend's quota.
    #[error("Storage quota exceeded: need {needed} bytes, quota is {quota}")]
    QuotaExceeded { needed: u64, quota: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// Synchronous string storage keyed by name.
pub trait PinStorage: Send + Sync {
    /// Read the value stored under `key`.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StorageError>;
}

fn check_quota(used: u64, incoming: u64, quota: Option<u64>) -> Result<(), StorageError> {
    match quota {
        Some(quota) if used + incoming > quota => Err(StorageError::QuotaExceeded {
            needed: used + incoming,
            quota,
        }),
        _ => Ok(()),
    }
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<u64>,
}

impl MemoryStorage {
    /// Unbounded storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage limited to `quota` bytes.
    pub fn with_quota(quota: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    /// Total bytes stored.
    pub fn used_bytes(&self) -> u64 {
        self.entries
            .lock()
            .values()
            .map(|v| v.len() as u64)
            .sum()
    }
}

impl PinStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        let used: u64 = entries.values().map(|v| v.len() as u64).sum();
        check_quota(used, value.len() as u64, self.quota)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

/// File-backed storage: one `<key>.json` file per key.
///
/// Key characters outside `[A-Za-z0-9_-]` are replaced with `_` to form the
/// file name.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    quota: Option<u64>,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Storage rooted at `dir` with the default quota.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota: Some(DEFAULT_QUOTA_BYTES),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = quota;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    fn used_bytes(&self) -> io::Result<u64> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut total = 0;
        for entry in entries {
            let entry = entry?;
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                total += entry.metadata()?.len();
            }
        }
        Ok(total)
    }
}

impl PinStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        check_quota(self.used_bytes()?, value.len() as u64, self.quota)?;

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.load("k").unwrap(), None);
        storage.save("k", "[1]").unwrap();
        assert_eq!(storage.load("k").unwrap().as_deref(), Some("[1]"));
        assert!(storage.remove("k").unwrap());
        assert!(!storage.remove("k").unwrap());
    }

    #[test]
    fn test_memory_quota_counts_replaced_value() {
        let storage = MemoryStorage::with_quota(10);
        storage.save("k", "123456").unwrap();

        let err = storage.save("k", "12345678").unwrap_err();
        assert!(err.is_quota_exceeded());

        storage.remove("k").unwrap();
        storage.save("k", "12345678").unwrap();
        assert_eq!(storage.used_bytes(), 8);
    }

    #[test]
    fn test_file_storage_paths() {
        let storage = FileStorage::new("/tmp/pins");
        assert_eq!(
            storage.path_for("agrowatch:pins:ndvi"),
            PathBuf::from("/tmp/pins/agrowatch_pins_ndvi.json")
        );
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("pins"));

        assert_eq!(storage.load("agrowatch:pins:ndvi").unwrap(), None);
        storage.save("agrowatch:pins:ndvi", "[]").unwrap();
        assert_eq!(
            storage.load("agrowatch:pins:ndvi").unwrap().as_deref(),
            Some("[]")
        );
        assert!(!storage.path_for("agrowatch:pins:ndvi").with_extension("tmp").exists());
        assert!(storage.remove("agrowatch:pins:ndvi").unwrap());
        assert_eq!(storage.load("agrowatch:pins:ndvi").unwrap(), None);
    }

    #[test]
    fn test_file_quota() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).with_quota(Some(16));

        storage.save("a", "0123456789").unwrap();
        assert!(storage.save("b", "0123456789").unwrap_err().is_quota_exceeded());

        storage.remove("a").unwrap();
        storage.save("b", "0123456789").unwrap();
    }
}
