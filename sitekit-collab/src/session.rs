//! One client's collaboration session on one page.
//!
//! `CollabSession` is a plain state container: no globals, no background
//! tasks, no wall clock. Callers feed it local actions and inbound
//! envelopes, and call [`CollabSession::tick`] at (or after)
//! [`CollabSession::next_deadline`]. The async [`crate::driver`] does that
//! for real connections; tests do it by hand with a `ManualClock`.
//!
//! ```text
//! local action ──► lock check ──► EditorStore ──► SyncEngine (50ms) ──► Transport
//!                                      │
//!                                      └────────► Autosave (5s) ──────► LayoutPersistence
//!
//! Transport inbox ──► handle_envelope ──► PresenceStore | SyncEngine::apply_remote
//! ```

use std::sync::Arc;
use std::time::Duration;

use sitekit_core::{Block, BlockId, CoreError, Identity, LayoutDocument, PropMap, RoomId, StyleMap};
use uuid::Uuid;

use crate::autosave::{Autosave, SaveStatus};
use crate::clock::Clock;
use crate::config::CollabConfig;
use crate::lock::{LockConflict, LockCoordinator};
use crate::presence::{PresenceMessage, PresencePatch, PresenceRecord, PresenceStore, Vec2};
use crate::protocol::{CollabEvent, Envelope, PeerInfo};
use crate::storage::{LayoutPersistence, StoreError};
use crate::store::EditorStore;
use crate::sync::{SyncEngine, SyncState, SyncStats};
use crate::transport::Transport;

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct SessionServices {
    pub transport: Arc<dyn Transport>,
    pub persistence: Arc<dyn LayoutPersistence>,
    pub clock: Arc<dyn Clock>,
}

/// Result of [`CollabSession::try_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    /// Someone else holds it; show their badge.
    Conflict(LockConflict),
    UnknownBlock,
    ReadOnly,
    Closed,
}

/// Result of a layout mutation. Only `Applied` changed anything.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Applied,
    /// Target (or something in its subtree) is locked by a peer.
    Locked(LockConflict),
    Rejected(CoreError),
    ReadOnly,
    Closed,
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }
}

/// What a [`CollabSession::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub broadcast: bool,
    pub saved: bool,
    pub save_failed: bool,
    pub heartbeat: bool,
    pub pruned: Vec<Uuid>,
}

/// What [`CollabSession::teardown`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub flushed_broadcast: bool,
    pub saved: bool,
    pub save_failed: bool,
}

pub struct CollabSession {
    room: RoomId,
    identity: Identity,
    connection_id: Uuid,
    config: CollabConfig,
    services: SessionServices,
    store: EditorStore,
    presence: PresenceStore,
    sync: SyncEngine,
    autosave: Autosave,
    seq: u64,
    next_heartbeat: u64,
    closed: bool,
}

impl CollabSession {
    /// Load the page layout, announce ourselves to the room and return the
    /// live session. A page that was never saved starts empty.
    pub fn join(
        room: RoomId,
        identity: Identity,
        connection_id: Uuid,
        services: SessionServices,
        config: CollabConfig,
    ) -> Result<Self, StoreError> {
        let key = room.to_string();
        let layout = match services.persistence.load(&key) {
            Ok(layout) => layout,
            Err(StoreError::NotFound(_)) => {
                log::info!("No saved layout for {room}, starting empty");
                LayoutDocument::new()
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = layout.validate() {
            log::warn!("Stored layout for {room} is inconsistent: {e}");
        }

        let now = services.clock.now_ms();
        let mut autosave = Autosave::new(config.autosave_debounce);
        autosave.mark_clean(0);

        let mut session = Self {
            presence: PresenceStore::new(connection_id, &identity),
            store: EditorStore::new(layout),
            sync: SyncEngine::new(config.broadcast_debounce),
            autosave,
            next_heartbeat: now + config.heartbeat_interval.as_millis() as u64,
            seq: 0,
            closed: false,
            room,
            identity,
            connection_id,
            config,
            services,
        };

        let join = session.presence.join_message();
        session.send_presence(join);
        log::info!(
            "{} ({}) joined {} as {}",
            session.identity.name,
            session.identity.user_id,
            session.room,
            connection_id
        );
        Ok(session)
    }

    // ─── Accessors ────────────────────────────────────────────────────

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn peer_info(&self) -> PeerInfo {
        PeerInfo::from_record(self.presence.self_record())
    }

    pub fn layout(&self) -> &LayoutDocument {
        self.store.layout()
    }

    pub fn store(&self) -> &EditorStore {
        &self.store
    }

    pub fn self_record(&self) -> &PresenceRecord {
        self.presence.self_record()
    }

    pub fn others(&self) -> Vec<&PresenceRecord> {
        self.presence.list_others()
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn sync_stats(&self) -> &SyncStats {
        self.sync.stats()
    }

    pub fn save_status(&self) -> &SaveStatus {
        self.autosave.status()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ─── Presence ─────────────────────────────────────────────────────

    /// Merge a presence patch and propagate it.
    pub fn update_presence(&mut self, patch: PresencePatch) {
        if self.closed {
            return;
        }
        let msg = self.presence.update_presence(patch);
        self.send_presence(msg);
    }

    pub fn move_cursor(&mut self, position: Option<Vec2>) {
        self.update_presence(PresencePatch::default().cursor(position));
    }

    /// Select a block. Selection is shared through presence and mirrored in
    /// the local store.
    pub fn select_block(&mut self, block: Option<BlockId>) {
        self.store.set_selection(block.clone());
        self.update_presence(PresencePatch::default().selected(block));
    }

    /// Hover is local UI state only.
    pub fn set_hover(&mut self, block: Option<BlockId>) {
        self.store.set_hover(block);
    }

    // ─── Locks ────────────────────────────────────────────────────────

    pub fn try_lock(&mut self, block_id: &BlockId) -> LockOutcome {
        if self.closed {
            return LockOutcome::Closed;
        }
        if !self.identity.role.can_edit() {
            return LockOutcome::ReadOnly;
        }
        if !self.store.layout().contains_block(block_id) {
            return LockOutcome::UnknownBlock;
        }
        match LockCoordinator::try_lock(&mut self.presence, block_id) {
            Ok(msg) => {
                self.store.set_selection(Some(block_id.clone()));
                self.send_presence(msg);
                LockOutcome::Acquired
            }
            Err(conflict) => {
                log::debug!(
                    "Lock on {} refused: held by {}",
                    conflict.block_id,
                    conflict.holder_name
                );
                LockOutcome::Conflict(conflict)
            }
        }
    }

    pub fn release_lock(&mut self) {
        if self.closed {
            return;
        }
        if let Some(msg) = LockCoordinator::release(&mut self.presence) {
            self.send_presence(msg);
        }
    }

    /// The peer holding `block_id`, for the "locked by" badge.
    pub fn lock_holder(&self, block_id: &BlockId) -> Option<&PresenceRecord> {
        LockCoordinator::holder(&self.presence, block_id)
    }

    // ─── Layout mutations ─────────────────────────────────────────────

    pub fn update_block_props(&mut self, block_id: &BlockId, patch: PropMap) -> MutationOutcome {
        if let Err(outcome) = self.guard(&[block_id]) {
            return outcome;
        }
        let result = self.store.edit(|doc| doc.update_block_props(block_id, patch));
        self.finish(result)
    }

    pub fn update_block_style(&mut self, block_id: &BlockId, patch: StyleMap) -> MutationOutcome {
        if let Err(outcome) = self.guard(&[block_id]) {
            return outcome;
        }
        let result = self.store.edit(|doc| doc.update_block_style(block_id, patch));
        self.finish(result)
    }

    /// Insert a new block; inserting into a parent counts as editing the parent.
    pub fn insert_block(
        &mut self,
        page_id: &str,
        parent: Option<&BlockId>,
        index: usize,
        block: Block,
    ) -> MutationOutcome {
        let targets: Vec<&BlockId> = parent.into_iter().collect();
        if let Err(outcome) = self.guard(&targets) {
            return outcome;
        }
        let result = self.store.edit(|doc| doc.insert_block(page_id, parent, index, block));
        self.finish(result)
    }

    /// Remove a block with its subtree. Refused if any block in it is locked.
    pub fn remove_block(&mut self, block_id: &BlockId) -> MutationOutcome {
        if let Err(outcome) = self.guard_subtree(block_id, None) {
            return outcome;
        }
        let result = self.store.edit(|doc| doc.remove_block(block_id).map(|_| ()));
        self.finish(result)
    }

    pub fn move_block(
        &mut self,
        block_id: &BlockId,
        page_id: &str,
        new_parent: Option<&BlockId>,
        index: usize,
    ) -> MutationOutcome {
        if let Err(outcome) = self.guard_subtree(block_id, new_parent) {
            return outcome;
        }
        let result = self
            .store
            .edit(|doc| doc.move_block(block_id, page_id, new_parent, index));
        self.finish(result)
    }

    /// Replace the whole document (template apply, undo to checkpoint).
    /// Not subject to block locks.
    pub fn replace_layout(&mut self, layout: LayoutDocument) -> MutationOutcome {
        if let Err(outcome) = self.guard(&[]) {
            return outcome;
        }
        if let Err(e) = layout.validate() {
            return MutationOutcome::Rejected(e);
        }
        self.store.replace_layout(layout);
        self.on_local_change();
        MutationOutcome::Applied
    }

    // ─── Inbound ──────────────────────────────────────────────────────

    /// Feed one envelope from the transport.
    pub fn handle_envelope(&mut self, envelope: Envelope) {
        if self.closed {
            return;
        }
        if envelope.room != self.room {
            log::warn!("Dropping envelope for {} delivered to {}", envelope.room, self.room);
            return;
        }
        if envelope.sender == self.connection_id {
            return;
        }

        let now = self.services.clock.now_ms();
        match envelope.event {
            CollabEvent::LayoutSync { layout_document } => {
                match self.sync.apply_remote(&mut self.store, layout_document, now) {
                    Ok(()) => {
                        self.autosave.on_change(now);
                        log::debug!("Applied layout from {} in {}", envelope.sender, self.room);
                    }
                    Err(e) => {
                        log::warn!("Ignoring invalid layout from {}: {e}", envelope.sender);
                    }
                }
            }
            CollabEvent::Presence { message } => {
                if message.connection_id() != envelope.sender {
                    log::warn!(
                        "Ignoring presence for {} sent by {}",
                        message.connection_id(),
                        envelope.sender
                    );
                    return;
                }
                if let Some(reply) = self.presence.apply_remote(&message, now) {
                    self.send_presence(reply);
                }
            }
        }
    }

    // ─── Timers ───────────────────────────────────────────────────────

    /// Earliest time at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        if self.closed {
            return None;
        }
        [self.sync.deadline(), self.autosave.deadline(), Some(self.next_heartbeat)]
            .into_iter()
            .flatten()
            .min()
    }

    /// Time left until [`next_deadline`](Self::next_deadline) on the session clock.
    pub fn until_next_deadline(&self) -> Option<Duration> {
        let deadline = self.next_deadline()?;
        let now = self.services.clock.now_ms();
        Some(Duration::from_millis(deadline.saturating_sub(now)))
    }

    /// Fire every timer whose deadline has passed.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if self.closed {
            return report;
        }
        let now = self.services.clock.now_ms();

        if let Some(event) = self.sync.poll(now, self.store.layout()) {
            self.send_event(event);
            report.broadcast = true;
        }

        if self.autosave.poll(now) {
            match self.save(now) {
                Ok(()) => report.saved = true,
                Err(_) => report.save_failed = true,
            }
        }

        if now >= self.next_heartbeat {
            let msg = self.presence.heartbeat();
            self.send_presence(msg);
            self.next_heartbeat = now + self.config.heartbeat_interval.as_millis() as u64;
            report.heartbeat = true;
        }

        report.pruned = self
            .presence
            .prune_stale(now, self.config.presence_timeout.as_millis() as u64);
        report
    }

    /// Unmount: flush a pending broadcast, save immediately if anything is
    /// unsaved, then clear our presence and tell the room we left.
    pub fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.closed {
            return report;
        }
        let now = self.services.clock.now_ms();

        if let Some(event) = self.sync.flush(self.store.layout()) {
            self.send_event(event);
            report.flushed_broadcast = true;
        }

        let pending = self.autosave.flush();
        if pending || self.autosave.is_dirty(self.store.revision()) {
            match self.save(now) {
                Ok(()) => report.saved = true,
                Err(_) => report.save_failed = true,
            }
        }

        let leave = self.presence.disconnect();
        self.send_presence(leave);
        self.closed = true;
        log::info!("{} left {}", self.connection_id, self.room);
        report
    }

    // ─── Internals ────────────────────────────────────────────────────

    fn save(&mut self, now: u64) -> Result<(), StoreError> {
        let key = self.room.to_string();
        self.autosave.save_now(
            self.services.persistence.as_ref(),
            &key,
            self.store.layout(),
            self.store.revision(),
            now,
        )
    }

    /// Role, liveness and lock checks shared by every mutation.
    fn guard(&self, targets: &[&BlockId]) -> Result<(), MutationOutcome> {
        if self.closed {
            return Err(MutationOutcome::Closed);
        }
        if !self.identity.role.can_edit() {
            return Err(MutationOutcome::ReadOnly);
        }
        for target in targets {
            LockCoordinator::check(&self.presence, target).map_err(MutationOutcome::Locked)?;
        }
        Ok(())
    }

    /// Like [`guard`](Self::guard), but any lock inside `block_id`'s subtree also blocks.
    fn guard_subtree(
        &self,
        block_id: &BlockId,
        extra: Option<&BlockId>,
    ) -> Result<(), MutationOutcome> {
        let targets: Vec<&BlockId> = std::iter::once(block_id).chain(extra).collect();
        self.guard(&targets)?;

        if let Some(block) = self.store.layout().find_block(block_id) {
            for peer in self.presence.list_others() {
                if let Some(locked) = &peer.locked_block_id {
                    if block.contains(locked) {
                        return Err(MutationOutcome::Locked(LockConflict {
                            block_id: locked.clone(),
                            holder: peer.connection_id,
                            holder_name: peer.name.clone(),
                        }));
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self, result: Result<(), CoreError>) -> MutationOutcome {
        match result {
            Ok(()) => {
                self.on_local_change();
                MutationOutcome::Applied
            }
            Err(e) => {
                log::debug!("Rejected edit in {}: {e}", self.room);
                MutationOutcome::Rejected(e)
            }
        }
    }

    fn on_local_change(&mut self) {
        let now = self.services.clock.now_ms();
        self.sync.on_layout_changed(now);
        self.autosave.on_change(now);
    }

    fn send_presence(&mut self, message: PresenceMessage) {
        self.send_event(CollabEvent::Presence { message });
    }

    /// Fire and forget: failures are logged, never retried or surfaced.
    fn send_event(&mut self, event: CollabEvent) {
        let envelope = Envelope::new(self.room.clone(), self.connection_id, self.seq, event);
        self.seq += 1;
        if let Err(e) = self.services.transport.send(&envelope) {
            log::warn!("Send from {} in {} failed: {e}", self.connection_id, self.room);
        }
    }
}
