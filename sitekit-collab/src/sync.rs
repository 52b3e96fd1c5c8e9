//! Debounced snapshot broadcaster and remote applier.
//!
//! ```text
//!            local edit                     timer fires
//!   Idle ───────────────► Pending ─────────────────────────► Idle
//!    ▲    (arm debounce)    │ local edit: re-arm           (emit LAYOUT_SYNC)
//!    │                      │
//!    └──────────────────────┘ remote LAYOUT_SYNC: apply, cancel, no echo
//! ```
//!
//! Loop prevention: a remote snapshot is applied with `applying_remote` set,
//! and change notifications raised while the flag is up never arm the
//! broadcast timer.

use std::time::Duration;

use sitekit_core::{CoreError, LayoutDocument};

use crate::clock::Debouncer;
use crate::protocol::CollabEvent;
use crate::store::EditorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Pending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub broadcasts: u64,
    pub remote_applied: u64,
    pub remote_rejected: u64,
    /// Pending local broadcasts dropped because a remote snapshot landed first.
    pub superseded: u64,
}

#[derive(Debug)]
pub struct SyncEngine {
    debounce: Debouncer,
    applying_remote: bool,
    stats: SyncStats,
}

impl SyncEngine {
    pub fn new(window: Duration) -> Self {
        Self {
            debounce: Debouncer::new(window),
            applying_remote: false,
            stats: SyncStats::default(),
        }
    }

    pub fn state(&self) -> SyncState {
        if self.debounce.is_pending() {
            SyncState::Pending
        } else {
            SyncState::Idle
        }
    }

    pub fn deadline(&self) -> Option<u64> {
        self.debounce.deadline()
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Layout-changed notification. Ignored while a remote apply is in progress.
    pub fn on_layout_changed(&mut self, now: u64) {
        if self.applying_remote {
            return;
        }
        self.debounce.touch(now);
    }

    /// Emit a snapshot of `layout` if the debounce window has elapsed.
    pub fn poll(&mut self, now: u64, layout: &LayoutDocument) -> Option<CollabEvent> {
        if !self.debounce.poll(now) {
            return None;
        }
        Some(self.snapshot(layout))
    }

    /// Emit immediately if a broadcast is pending (teardown).
    pub fn flush(&mut self, layout: &LayoutDocument) -> Option<CollabEvent> {
        if self.debounce.flush().is_none() {
            return None;
        }
        Some(self.snapshot(layout))
    }

    /// Replace the local layout with a peer's snapshot.
    ///
    /// Invalid snapshots are rejected and leave the store untouched. A
    /// pending local broadcast is cancelled: its edits were overwritten.
    pub fn apply_remote(
        &mut self,
        store: &mut EditorStore,
        snapshot: LayoutDocument,
        now: u64,
    ) -> Result<(), CoreError> {
        if let Err(e) = snapshot.validate() {
            self.stats.remote_rejected += 1;
            return Err(e);
        }

        self.applying_remote = true;
        if self.debounce.cancel() {
            self.stats.superseded += 1;
        }
        store.replace_layout(snapshot);
        // the store's change notification re-enters here and is swallowed
        self.on_layout_changed(now);
        self.applying_remote = false;

        self.stats.remote_applied += 1;
        Ok(())
    }

    fn snapshot(&mut self, layout: &LayoutDocument) -> CollabEvent {
        self.stats.broadcasts += 1;
        CollabEvent::LayoutSync {
            layout_document: layout.clone(),
        }
    }
}
