//! WebSocket client transport for talking to the relay.
//!
//! `WsTransport::connect` spawns two tasks: a writer draining an unbounded
//! queue into the socket and a reader decoding frames into the [`Inbox`].
//! When the socket closes the reader drops its sender, so the inbox ends
//! and the session driver tears down.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::protocol::Envelope;
use crate::transport::{Inbox, Transport, TransportError};

/// Sending half of a relay connection.
pub struct WsTransport {
    outgoing: mpsc::UnboundedSender<String>,
    connection_id: Uuid,
}

impl WsTransport {
    /// Connect to `url` (e.g. `ws://127.0.0.1:9090`) on behalf of `connection_id`.
    ///
    /// The first envelope sent must be the session's presence join.
    pub async fn connect(url: &str, connection_id: Uuid) -> Result<(Self, Inbox), TransportError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        log::info!("Connected to relay at {url}");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = ws_writer.send(Message::text(text)).await {
                    log::warn!("Relay write failed: {e}");
                    break;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        let (in_tx, inbox) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                let bytes: Vec<u8> = match msg {
                    Ok(Message::Text(text)) => text.as_bytes().to_vec(),
                    Ok(Message::Binary(data)) => data.to_vec(),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        log::warn!("Relay read failed: {e}");
                        break;
                    }
                };
                match Envelope::decode(&bytes) {
                    Ok(env) if env.sender == connection_id => {}
                    Ok(env) => {
                        if in_tx.send(env).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("Dropping undecodable relay frame: {e}"),
                }
            }
            log::info!("Relay connection closed for {connection_id}");
        });

        Ok((
            Self {
                outgoing: out_tx,
                connection_id,
            },
            inbox,
        ))
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }
}

impl Transport for WsTransport {
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let bytes = envelope.encode()?;
        let text = String::from_utf8(bytes)
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        self.outgoing.send(text).map_err(|_| TransportError::Closed)
    }
}
