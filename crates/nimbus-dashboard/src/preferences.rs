//! Key-value preference storage.
//!
//! Values are scalar strings under fixed keys. Storage failures never stop
//! the dashboard: the `*_or_warn` helpers log and carry on.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use nimbus_core::StorageError;
use parking_lot::Mutex;

/// Persisted preference keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKey {
    Theme,
    Unit,
    ActiveTab,
    LastLocation,
    LocationPermission,
    LastUpdate,
    AppVisited,
}

impl PrefKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Theme => "weather-theme",
            Self::Unit => "weather-unit",
            Self::ActiveTab => "weather-active-tab",
            Self::LastLocation => "weather-last-location",
            Self::LocationPermission => "weather-location-permission",
            Self::LastUpdate => "weather-last-update",
            Self::AppVisited => "weather-app-visited",
        }
    }
}

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: PrefKey) -> Result<Option<String>, StorageError>;

    fn set(&self, key: PrefKey, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: PrefKey) -> Result<(), StorageError>;

    /// Reads `key`, treating failures as absent.
    fn get_or_warn(&self, key: PrefKey) -> Option<String> {
        match self.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read preference {}: {}", key.as_str(), e);
                None
            }
        }
    }

    /// Writes `key`, logging instead of failing.
    fn set_or_warn(&self, key: PrefKey, value: &str) {
        if let Err(e) = self.set(key, value) {
            tracing::warn!("Failed to save preference {}: {}", key.as_str(), e);
        }
    }
}

/// Preferences kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<PrefKey, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: PrefKey, value: &str) -> Self {
        self.values.lock().insert(key, value.to_string());
        self
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: PrefKey) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(&key).cloned())
    }

    fn set(&self, key: PrefKey, value: &str) -> Result<(), StorageError> {
        self.values.lock().insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: PrefKey) -> Result<(), StorageError> {
        self.values.lock().remove(&key);
        Ok(())
    }
}

/// Preferences stored as a flat JSON object in the config directory
pub struct JsonFilePreferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFilePreferences {
    /// Opens the file at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match Self::read_file(&path) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("Resetting preferences at {:?}: {}", path, e);
                BTreeMap::new()
            }
        };

        tracing::debug!("Loaded {} preferences from {:?}", values.len(), path);
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let json =
            fs::read_to_string(path).map_err(|e| StorageError::ReadFailed(e.to_string()))?;

        serde_json::from_str(&json).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    fn write_file(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(values)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        fs::write(&self.path, json).map_err(|e| StorageError::WriteFailed(e.to_string()))
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: PrefKey) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key.as_str()).cloned())
    }

    fn set(&self, key: PrefKey, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        values.insert(key.as_str().to_string(), value.to_string());
        self.write_file(&values)
    }

    fn remove(&self, key: PrefKey) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        if values.remove(key.as_str()).is_some() {
            self.write_file(&values)?;
        }
        Ok(())
    }
}
