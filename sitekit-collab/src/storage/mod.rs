//! Durable layout persistence.
//!
//! ```text
//! ┌─────────────┐  5s debounce   ┌────────────────────┐
//! │ CollabSession│ ─────────────► │ LayoutPersistence  │
//! │ (autosave)  │  + unmount     └─────────┬──────────┘
//! └─────────────┘                          │
//!                          ┌───────────────┴───────────────┐
//!                          ▼                               ▼
//!                 MemoryLayoutStore               RocksLayoutStore
//!                 (tests, dev)                    CF "layouts"   — current snapshot (LZ4)
//!                                                 CF "revisions" — recent snapshots (LZ4)
//!                                                 CF "metadata"  — JSON metadata
//! ```
//!
//! Saves are whole-document writes keyed by the room id. There is no delta
//! log: the layout is small and last-write-wins, so a snapshot is the state.

pub mod memory;
pub mod rocks;

use sitekit_core::LayoutDocument;
use thiserror::Error;

pub use memory::MemoryLayoutStore;
pub use rocks::{LayoutMetadata, RocksLayoutStore, StoreConfig};

/// Storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Layout not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Durable home for layout documents.
pub trait LayoutPersistence: Send + Sync {
    fn save(&self, key: &str, layout: &LayoutDocument) -> Result<(), StoreError>;

    /// `StoreError::NotFound` when nothing was ever saved under `key`.
    fn load(&self, key: &str) -> Result<LayoutDocument, StoreError>;
}

/// Keys are embedded in composite RocksDB keys with a NUL separator.
pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.contains('\0') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key() {
        assert!(check_key("acme:shop:home").is_ok());
        assert_eq!(check_key(""), Err(StoreError::InvalidKey(String::new())));
        assert!(check_key("a\0b").is_err());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::NotFound("acme:shop:home".into());
        assert_eq!(err.to_string(), "Layout not found: acme:shop:home");
    }
}
