use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use sitekit_core::LayoutDocument;

use super::{check_key, LayoutPersistence, StoreError};

/// In-memory persistence for tests and local development.
///
/// Documents are stored as JSON so a save/load cycle behaves like a real
/// backend (no shared references survive). `set_failing` makes every save
/// fail, which is how autosave error paths are exercised.
#[derive(Debug, Default)]
pub struct MemoryLayoutStore {
    docs: RwLock<HashMap<String, Vec<u8>>>,
    saves: AtomicU64,
    failing: AtomicBool,
}

impl MemoryLayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful saves since creation.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.docs
            .read()
            .map(|docs| docs.contains_key(key))
            .unwrap_or(false)
    }
}

impl LayoutPersistence for MemoryLayoutStore {
    fn save(&self, key: &str, layout: &LayoutDocument) -> Result<(), StoreError> {
        check_key(key)?;
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database("store unavailable".into()));
        }
        let bytes =
            serde_json::to_vec(layout).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.docs
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?
            .insert(key.to_string(), bytes);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<LayoutDocument, StoreError> {
        check_key(key)?;
        let docs = self.docs.read().map_err(|e| StoreError::Database(e.to_string()))?;
        let bytes = docs
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
