//! Debounced durable persistence, independent of the broadcast path.

use std::time::Duration;

use sitekit_core::LayoutDocument;

use crate::clock::Debouncer;
use crate::storage::{LayoutPersistence, StoreError};

/// What the editor shows next to the save indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    Saved { revision: u64, at_ms: u64 },
    /// Not retried until the next change or the unmount flush.
    Failed { message: String, at_ms: u64 },
}

#[derive(Debug)]
pub struct Autosave {
    debounce: Debouncer,
    status: SaveStatus,
    saved_revision: Option<u64>,
}

impl Autosave {
    pub fn new(window: Duration) -> Self {
        Self {
            debounce: Debouncer::new(window),
            status: SaveStatus::Idle,
            saved_revision: None,
        }
    }

    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    pub fn deadline(&self) -> Option<u64> {
        self.debounce.deadline()
    }

    pub fn is_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    pub fn on_change(&mut self, now: u64) {
        self.debounce.touch(now);
    }

    /// Whether the debounce window has elapsed and a save should run now.
    pub fn poll(&mut self, now: u64) -> bool {
        self.debounce.poll(now)
    }

    /// Disarm and report whether a save was pending (unmount path).
    pub fn flush(&mut self) -> bool {
        self.debounce.flush().is_some()
    }

    /// Record `revision` as already durable (e.g. freshly loaded).
    pub fn mark_clean(&mut self, revision: u64) {
        self.saved_revision = Some(revision);
    }

    /// Whether `revision` still needs writing.
    pub fn is_dirty(&self, revision: u64) -> bool {
        self.saved_revision != Some(revision)
    }

    /// Persist `layout` and record the outcome in the status.
    pub fn save_now(
        &mut self,
        persistence: &dyn LayoutPersistence,
        key: &str,
        layout: &LayoutDocument,
        revision: u64,
        now: u64,
    ) -> Result<(), StoreError> {
        self.debounce.cancel();
        match persistence.save(key, layout) {
            Ok(()) => {
                self.saved_revision = Some(revision);
                self.status = SaveStatus::Saved { revision, at_ms: now };
                log::debug!("Autosaved {key} at revision {revision}");
                Ok(())
            }
            Err(e) => {
                log::error!("Autosave of {key} failed: {e}");
                self.status = SaveStatus::Failed {
                    message: e.to_string(),
                    at_ms: now,
                };
                Err(e)
            }
        }
    }
}
