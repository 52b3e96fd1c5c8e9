//! Transport seam between a session and the room.
//!
//! A session only ever calls [`Transport::send`]; inbound envelopes arrive
//! on an [`Inbox`]. The same session code runs over the in-process hub
//! ([`LocalTransport`]) and over WebSockets (`client::WsTransport`).

use std::sync::Arc;

use sitekit_core::RoomId;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::broadcast::{BroadcastGroup, Frame, RoomJoin, RoomManager};
use crate::protocol::{Envelope, PeerInfo, ProtocolError};

/// Inbound envelopes for one connection, in per-sender FIFO order.
pub type Inbox = mpsc::UnboundedReceiver<Envelope>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,
    #[error("Room {0} is full")]
    RoomFull(RoomId),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// Outbound half of a room connection.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError>;
}

/// Joins rooms on an in-process [`RoomManager`].
pub struct LocalHub {
    rooms: RoomManager,
    max_peers_per_room: usize,
}

impl LocalHub {
    pub fn new(capacity: usize, max_peers_per_room: usize) -> Self {
        Self {
            rooms: RoomManager::new(capacity),
            max_peers_per_room,
        }
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    /// Connect `peer` to `room`. The retained layout snapshot, if any, is the
    /// first envelope in the returned inbox.
    pub async fn join(
        self: &Arc<Self>,
        room: &RoomId,
        peer: PeerInfo,
    ) -> Result<(LocalTransport, Inbox), TransportError> {
        let connection_id = peer.connection_id;
        let RoomJoin {
            group,
            receiver: rx,
            retained,
        } = self
            .rooms
            .join_room(room, peer, self.max_peers_per_room)
            .await
            .ok_or_else(|| TransportError::RoomFull(room.clone()))?;
        let (tx, inbox) = mpsc::unbounded_channel();

        if let Some(frame) = retained {
            match Envelope::decode(&frame) {
                Ok(env) => {
                    let _ = tx.send(env);
                }
                Err(e) => log::warn!("Dropping undecodable retained snapshot in {room}: {e}"),
            }
        }

        tokio::spawn(forward(self.clone(), room.clone(), group.clone(), connection_id, rx, tx));

        Ok((
            LocalTransport {
                group,
                connection_id,
            },
            inbox,
        ))
    }
}

/// Pump one peer's broadcast receiver into its inbox until either side closes.
async fn forward(
    hub: Arc<LocalHub>,
    room: RoomId,
    group: Arc<BroadcastGroup>,
    connection_id: Uuid,
    mut rx: broadcast::Receiver<Frame>,
    tx: mpsc::UnboundedSender<Envelope>,
) {
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Ok(frame) => {
                    let env = match Envelope::decode(&frame) {
                        Ok(env) => env,
                        Err(e) => {
                            log::warn!("Undecodable frame in {room}: {e}");
                            continue;
                        }
                    };
                    if env.sender == connection_id {
                        continue;
                    }
                    if tx.send(env).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Peer {connection_id} lagged by {n} messages in {room}");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tx.closed() => break,
        }
    }

    group.remove_peer(&connection_id).await;
    hub.rooms.remove_if_empty(&room).await;
    log::debug!("Peer {connection_id} detached from {room}");
}

/// Sending half of an in-process room connection.
pub struct LocalTransport {
    group: Arc<BroadcastGroup>,
    connection_id: Uuid,
}

impl LocalTransport {
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }
}

impl Transport for LocalTransport {
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.group.broadcast(envelope)?;
        Ok(())
    }
}
