//! JSON wire protocol for room traffic.
//!
//! Every frame is one [`Envelope`]:
//! ```text
//! {
//!   "room":   "tenant:site:page",
//!   "sender": "<connection uuid>",
//!   "seq":    42,
//!   "event":  { "type": "LAYOUT_SYNC", "layoutDocument": { ... } }
//!          |  { "type": "PRESENCE", "message": { "kind": "join", ... } }
//! }
//! ```
//!
//! `seq` increases per sender; delivery is FIFO per sender with no global
//! order. Layout events always carry a full snapshot, never a diff.

use serde::{Deserialize, Serialize};
use sitekit_core::{LayoutDocument, RoomId};
use thiserror::Error;
use uuid::Uuid;

use crate::presence::{PresenceMessage, PresenceRecord};

/// Peer identity tracked by the hub and relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub connection_id: Uuid,
    pub user_id: String,
    pub name: String,
}

impl PeerInfo {
    pub fn new(connection_id: Uuid, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            connection_id,
            user_id: user_id.into(),
            name: name.into(),
        }
    }

    pub fn from_record(record: &PresenceRecord) -> Self {
        Self::new(record.connection_id, record.user_id.clone(), record.name.clone())
    }
}

/// Payload of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CollabEvent {
    /// Full layout snapshot; receivers replace their layout wholesale.
    #[serde(rename = "LAYOUT_SYNC")]
    LayoutSync {
        #[serde(rename = "layoutDocument")]
        layout_document: LayoutDocument,
    },
    #[serde(rename = "PRESENCE")]
    Presence { message: PresenceMessage },
}

/// One frame of room traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub room: RoomId,
    pub sender: Uuid,
    pub seq: u64,
    pub event: CollabEvent,
}

impl Envelope {
    pub fn new(room: RoomId, sender: Uuid, seq: u64, event: CollabEvent) -> Self {
        Self {
            room,
            sender,
            seq,
            event,
        }
    }

    pub fn layout_sync(room: RoomId, sender: Uuid, seq: u64, layout: LayoutDocument) -> Self {
        Self::new(room, sender, seq, CollabEvent::LayoutSync { layout_document: layout })
    }

    pub fn presence(room: RoomId, sender: Uuid, seq: u64, message: PresenceMessage) -> Self {
        Self::new(room, sender, seq, CollabEvent::Presence { message })
    }

    pub fn is_layout_sync(&self) -> bool {
        matches!(self.event, CollabEvent::LayoutSync { .. })
    }

    pub fn presence_message(&self) -> Option<&PresenceMessage> {
        match &self.event {
            CollabEvent::Presence { message } => Some(message),
            CollabEvent::LayoutSync { .. } => None,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}
