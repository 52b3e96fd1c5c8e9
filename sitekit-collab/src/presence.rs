//! Presence protocol: who is in the room, where their cursor is, which
//! block they have selected and which block they are editing.
//!
//! ## Data flow
//!
//! ```text
//! local interaction
//!       │
//!       ▼
//! PresenceStore::update_presence(patch)
//!       │
//!       ▼
//! PresenceMessage::Update { record }   ── broadcast to the room
//!       │
//!       ▼
//! remote PresenceStore::apply_remote()
//! ```
//!
//! Records are ephemeral. A leave (or a peer going silent past the idle
//! timeout) removes the record, so a lock held through presence can never
//! outlive the connection that took it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sitekit_core::{BlockId, Identity};
use uuid::Uuid;

/// 2D position in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Default for Vec2 {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Stable, visually distinct display color for a connection, as `#rrggbb`.
///
/// Hue comes from the connection id so every peer sees the same color.
pub fn color_for(connection_id: Uuid) -> String {
    let hue = ((connection_id.as_u128() % 360) as f32) / 360.0;
    let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.5);
    format!(
        "#{:02x}{:02x}{:02x}",
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8
    )
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

/// One connection's presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub connection_id: Uuid,
    pub user_id: String,
    pub name: String,
    pub color: String,
    pub cursor: Option<Vec2>,
    pub locked_block_id: Option<BlockId>,
    pub selected_block_id: Option<BlockId>,
}

impl PresenceRecord {
    pub fn new(connection_id: Uuid, identity: &Identity) -> Self {
        Self {
            connection_id,
            user_id: identity.user_id.clone(),
            name: identity.name.clone(),
            color: color_for(connection_id),
            cursor: None,
            locked_block_id: None,
            selected_block_id: None,
        }
    }

    /// Null out everything tied to an active interaction.
    pub fn clear_interaction(&mut self) {
        self.cursor = None;
        self.locked_block_id = None;
        self.selected_block_id = None;
    }

    fn apply(&mut self, patch: PresencePatch) {
        if let Some(cursor) = patch.cursor {
            self.cursor = cursor;
        }
        if let Some(locked) = patch.locked_block_id {
            self.locked_block_id = locked;
        }
        if let Some(selected) = patch.selected_block_id {
            self.selected_block_id = selected;
        }
        if let Some(name) = patch.name {
            self.name = name;
        }
    }
}

/// Partial presence update. `None` leaves a field alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresencePatch {
    pub cursor: Option<Option<Vec2>>,
    pub locked_block_id: Option<Option<BlockId>>,
    pub selected_block_id: Option<Option<BlockId>>,
    pub name: Option<String>,
}

impl PresencePatch {
    pub fn cursor(mut self, position: Option<Vec2>) -> Self {
        self.cursor = Some(position);
        self
    }

    pub fn locked(mut self, block: Option<BlockId>) -> Self {
        self.locked_block_id = Some(block);
        self
    }

    pub fn selected(mut self, block: Option<BlockId>) -> Self {
        self.selected_block_id = Some(block);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Presence messages carried inside room envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PresenceMessage {
    /// A connection entered the room.
    Join { record: PresenceRecord },
    /// Full replacement of a connection's record (also used as heartbeat).
    Update { record: PresenceRecord },
    /// A connection left; its record must be dropped.
    Leave {
        #[serde(rename = "connectionId")]
        connection_id: Uuid,
    },
}

impl PresenceMessage {
    pub fn connection_id(&self) -> Uuid {
        match self {
            PresenceMessage::Join { record } | PresenceMessage::Update { record } => {
                record.connection_id
            }
            PresenceMessage::Leave { connection_id } => *connection_id,
        }
    }
}

#[derive(Debug, Clone)]
struct PeerPresence {
    record: PresenceRecord,
    last_seen: u64,
}

/// Presence for one session: the local record plus every peer's.
#[derive(Debug)]
pub struct PresenceStore {
    local: PresenceRecord,
    peers: HashMap<Uuid, PeerPresence>,
    connected: bool,
}

impl PresenceStore {
    pub fn new(connection_id: Uuid, identity: &Identity) -> Self {
        Self {
            local: PresenceRecord::new(connection_id, identity),
            peers: HashMap::new(),
            connected: true,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.local.connection_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The local connection's record.
    pub fn self_record(&self) -> &PresenceRecord {
        &self.local
    }

    /// All peer records, ordered by connection id.
    pub fn list_others(&self) -> Vec<&PresenceRecord> {
        let mut others: Vec<&PresenceRecord> = self.peers.values().map(|p| &p.record).collect();
        others.sort_by_key(|r| r.connection_id);
        others
    }

    pub fn peer(&self, connection_id: &Uuid) -> Option<&PresenceRecord> {
        self.peers.get(connection_id).map(|p| &p.record)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Merge `patch` into the local record; returns the message to propagate.
    pub fn update_presence(&mut self, patch: PresencePatch) -> PresenceMessage {
        self.local.apply(patch);
        PresenceMessage::Update {
            record: self.local.clone(),
        }
    }

    pub fn join_message(&self) -> PresenceMessage {
        PresenceMessage::Join {
            record: self.local.clone(),
        }
    }

    /// Periodic re-announcement so peers can tell we are still here.
    pub fn heartbeat(&self) -> PresenceMessage {
        PresenceMessage::Update {
            record: self.local.clone(),
        }
    }

    /// Apply a peer's presence message. Returns a reply when the peer is new
    /// and needs to learn our current record.
    pub fn apply_remote(&mut self, msg: &PresenceMessage, now: u64) -> Option<PresenceMessage> {
        if msg.connection_id() == self.local.connection_id {
            return None;
        }

        match msg {
            PresenceMessage::Join { record } => {
                log::debug!("Peer {} ({}) joined", record.connection_id, record.name);
                self.upsert(record.clone(), now);
                if self.connected {
                    Some(PresenceMessage::Update {
                        record: self.local.clone(),
                    })
                } else {
                    None
                }
            }
            PresenceMessage::Update { record } => {
                self.upsert(record.clone(), now);
                None
            }
            PresenceMessage::Leave { connection_id } => {
                if let Some(peer) = self.peers.remove(connection_id) {
                    log::debug!("Peer {} ({}) left", connection_id, peer.record.name);
                }
                None
            }
        }
    }

    /// Drop peers that have been silent longer than `timeout_ms`.
    pub fn prune_stale(&mut self, now: u64, timeout_ms: u64) -> Vec<Uuid> {
        let stale: Vec<Uuid> = self
            .peers
            .iter()
            .filter(|(_, p)| now.saturating_sub(p.last_seen) > timeout_ms)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            self.peers.remove(id);
            log::info!("Dropped stale presence for peer {id}");
        }
        stale
    }

    /// Clear the local cursor, lock and selection and forget all peers.
    /// Returns the leave message to send.
    pub fn disconnect(&mut self) -> PresenceMessage {
        self.local.clear_interaction();
        self.peers.clear();
        self.connected = false;
        PresenceMessage::Leave {
            connection_id: self.local.connection_id,
        }
    }

    fn upsert(&mut self, record: PresenceRecord, now: u64) {
        self.peers.insert(
            record.connection_id,
            PeerPresence {
                record,
                last_seen: now,
            },
        );
    }
}
