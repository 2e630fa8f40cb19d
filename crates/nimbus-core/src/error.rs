//! Error types shared by the Nimbus crates.
//!
//! Weather fetch failures have their own taxonomy in `nimbus-weather`.
//! Configuration errors go through `anyhow`, so only local storage is here.

use thiserror::Error;

/// Key-value preference storage errors.
///
/// These are never fatal: callers log them and carry on without persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage read failed: {0}")]
    ReadFailed(String),

    #[error("Storage write failed: {0}")]
    WriteFailed(String),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::Unavailable(_) => "Preferences cannot be saved on this device.",
            StorageError::ReadFailed(_) => "Saved preferences could not be read. Using defaults.",
            StorageError::WriteFailed(_) => "Preferences could not be saved.",
            StorageError::Corrupt(_) => "Saved preferences were reset to defaults.",
        }
    }
}
