//! WebSocket relay with room-based routing.
//!
//! ```text
//! Client A ──┐                       ┌──► Client B
//!             ├── Room (tenant:site:page) ── BroadcastGroup
//! Client C ──┘        │                └──► Client D
//!                     └── retained LAYOUT_SYNC frame (late joiners)
//! ```
//!
//! The relay is not an authority: it never parses layouts, never merges
//! and never persists. It checks that each frame belongs to the room and
//! connection that sent it, fans it out, and remembers the last snapshot.
//!
//! Handshake: the first text frame on a connection must be a presence
//! `join` envelope. Its `room` and `sender` bind the connection.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use sitekit_core::RoomId;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::broadcast::{Frame, RoomManager};
use crate::presence::PresenceMessage;
use crate::protocol::{Envelope, PeerInfo, ProtocolError};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Joins beyond this are refused with a close frame
    pub max_peers_per_room: usize,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_peers_per_room: 100,
            broadcast_capacity: 256,
        }
    }
}

impl RelayConfig {
    /// Ephemeral port, small rooms.
    pub fn for_testing() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            max_peers_per_room: 8,
            broadcast_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    /// Frames dropped for failing decode or room/sender checks.
    pub rejected_frames: u64,
    pub active_rooms: usize,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Handshake failed: {0}")]
    Handshake(String),
}

/// Per-connection state once the join handshake has succeeded.
struct Membership {
    room: RoomId,
    connection_id: Uuid,
    rx: broadcast::Receiver<Frame>,
    next_seq: u64,
    left: bool,
}

pub struct RelayServer {
    config: RelayConfig,
    rooms: Arc<RoomManager>,
    stats: Arc<RwLock<RelayStats>>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let rooms = Arc::new(RoomManager::new(config.broadcast_capacity));
        Self {
            config,
            rooms,
            stats: Arc::new(RwLock::new(RelayStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RelayConfig::default())
    }

    /// Bind the configured address and serve forever.
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Relay listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let rooms = self.rooms.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, rooms, stats, config).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        rooms: Arc<RoomManager>,
        stats: Arc<RwLock<RelayStats>>,
        config: RelayConfig,
    ) -> Result<(), RelayError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let mut member: Option<Membership> = None;
        let result = Self::pump(ws_stream, addr, &rooms, &stats, &config, &mut member).await;

        if let Some(m) = member {
            Self::depart(&rooms, m).await;
        }
        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_rooms = rooms.room_count().await;
        }
        result
    }

    /// Relay frames for one connection until it closes.
    async fn pump(
        ws_stream: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        rooms: &RoomManager,
        stats: &RwLock<RelayStats>,
        config: &RelayConfig,
        member: &mut Option<Membership>,
    ) -> Result<(), RelayError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    let bytes: Vec<u8> = match msg {
                        Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                        Some(Ok(Message::Binary(data))) => data.to_vec(),
                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }
                        Some(Err(e)) => {
                            log::warn!("WebSocket error from {addr}: {e}");
                            break;
                        }
                        Some(Ok(_)) => continue,
                    };

                    {
                        let mut s = stats.write().await;
                        s.total_messages += 1;
                        s.total_bytes += bytes.len() as u64;
                    }

                    let envelope = match Envelope::decode(&bytes) {
                        Ok(env) => env,
                        Err(e) => {
                            log::warn!("Undecodable frame from {addr}: {e}");
                            stats.write().await.rejected_frames += 1;
                            continue;
                        }
                    };

                    match member.as_mut() {
                        None => {
                            let joined = Self::admit(&envelope, rooms, config).await;
                            let (membership, retained) = match joined {
                                Ok(joined) => joined,
                                Err(reason) => {
                                    log::warn!("Refusing {addr}: {reason}");
                                    ws_sender.send(Message::Close(None)).await?;
                                    return Err(RelayError::Handshake(reason));
                                }
                            };
                            if let Some(frame) = retained {
                                ws_sender.send(text_message(&frame)).await?;
                            }
                            if let Some(group) = rooms.get(&membership.room).await {
                                group.broadcast_raw(Arc::new(bytes), false);
                            }
                            log::info!(
                                "Peer {} joined room {}",
                                membership.connection_id,
                                membership.room
                            );
                            stats.write().await.active_rooms = rooms.room_count().await;
                            *member = Some(Membership { next_seq: envelope.seq + 1, ..membership });
                        }
                        Some(m) => {
                            if envelope.room != m.room || envelope.sender != m.connection_id {
                                log::warn!(
                                    "Frame from {addr} claims {}/{}; connection is {}/{}",
                                    envelope.room, envelope.sender, m.room, m.connection_id
                                );
                                stats.write().await.rejected_frames += 1;
                                continue;
                            }
                            if let Some(presence) = envelope.presence_message() {
                                if presence.connection_id() != m.connection_id {
                                    stats.write().await.rejected_frames += 1;
                                    continue;
                                }
                                if matches!(presence, PresenceMessage::Leave { .. }) {
                                    m.left = true;
                                }
                            }
                            m.next_seq = m.next_seq.max(envelope.seq + 1);
                            if let Some(group) = rooms.get(&m.room).await {
                                group.broadcast_raw(Arc::new(bytes), envelope.is_layout_sync());
                            }
                        }
                    }
                }

                frame = async {
                    match member.as_mut() {
                        Some(m) => m.rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match frame {
                        Ok(frame) => {
                            let own = member
                                .as_ref()
                                .map(|m| is_from(&frame, m.connection_id))
                                .unwrap_or(false);
                            if !own {
                                ws_sender.send(text_message(&frame)).await?;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Peer at {addr} lagged by {n} messages");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate a handshake frame and register the peer.
    async fn admit(
        envelope: &Envelope,
        rooms: &RoomManager,
        config: &RelayConfig,
    ) -> Result<(Membership, Option<Frame>), String> {
        let record = match envelope.presence_message() {
            Some(PresenceMessage::Join { record }) => record,
            _ => return Err("first frame must be a presence join".into()),
        };
        if record.connection_id != envelope.sender {
            return Err("join record does not match sender".into());
        }

        let joined = rooms
            .join_room(&envelope.room, PeerInfo::from_record(record), config.max_peers_per_room)
            .await
            .ok_or_else(|| format!("room {} is full", envelope.room))?;

        Ok((
            Membership {
                room: envelope.room.clone(),
                connection_id: envelope.sender,
                rx: joined.receiver,
                next_seq: 0,
                left: false,
            },
            joined.retained,
        ))
    }

    /// Remove the peer and, unless it already said goodbye, tell the room it left.
    async fn depart(rooms: &RoomManager, m: Membership) {
        if let Some(group) = rooms.get(&m.room).await {
            group.remove_peer(&m.connection_id).await;
            if !m.left {
                let leave = Envelope::presence(
                    m.room.clone(),
                    m.connection_id,
                    m.next_seq,
                    PresenceMessage::Leave {
                        connection_id: m.connection_id,
                    },
                );
                if let Err(e) = group.broadcast(&leave) {
                    log::error!("Failed to announce departure of {}: {e}", m.connection_id);
                }
            }
        }
        rooms.remove_if_empty(&m.room).await;
        log::info!("Peer {} left room {}", m.connection_id, m.room);
    }

    pub async fn stats(&self) -> RelayStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }
}

fn text_message(frame: &Frame) -> Message {
    Message::text(String::from_utf8_lossy(frame).into_owned())
}

/// Cheap sender check without decoding the whole layout.
fn is_from(frame: &[u8], connection_id: Uuid) -> bool {
    #[derive(serde::Deserialize)]
    struct Header {
        sender: Uuid,
    }
    serde_json::from_slice::<Header>(frame)
        .map(|h| h.sender == connection_id)
        .unwrap_or(false)
}
