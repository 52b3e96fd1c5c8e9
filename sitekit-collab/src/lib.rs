//! # sitekit-collab — real-time collaboration core for the site builder
//!
//! Several editors work on the same page at once. Every client keeps a full
//! replica of the page layout and shares it with the room as whole-document
//! snapshots (last write wins). Block-level edit locks are derived from
//! presence, so a lock disappears the moment its holder does.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   Envelope (JSON)   ┌──────────────┐
//! │ CollabSession│ ◄─────────────────► │ RelayServer  │  or LocalHub (in-process)
//! │ (per editor) │   LAYOUT_SYNC /     │ (fan-out,    │
//! └──────┬───────┘   PRESENCE          │ no authority)│
//!        │                             └──────┬───────┘
//!        ├── PresenceStore + LockCoordinator  │
//!        ├── SyncEngine   (50ms debounce)     ▼
//!        ├── Autosave     (5s debounce) ┌──────────────┐
//!        │                              │BroadcastGroup│ per room,
//!        ▼                              │ + last layout│ retains snapshot
//! ┌──────────────────┐                  └──────────────┘
//! │ LayoutPersistence│  memory | RocksDB (LZ4)
//! └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`session`] — the per-editor state container tying everything together
//! - [`presence`] / [`lock`] — ephemeral per-connection state and derived locks
//! - [`sync`] / [`autosave`] — debounced broadcast and persistence
//! - [`clock`] — injected time source and debounce timers
//! - [`protocol`] — JSON wire envelopes
//! - [`broadcast`] / [`transport`] — room fan-out and the transport seam
//! - [`server`] / [`client`] — WebSocket relay and client transport
//! - [`driver`] — async loop that runs a session against a live transport
//! - [`storage`] — durable layout persistence

pub mod autosave;
pub mod broadcast;
pub mod client;
pub mod clock;
pub mod config;
pub mod driver;
pub mod lock;
pub mod presence;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;
pub mod transport;

pub use autosave::{Autosave, SaveStatus};
pub use broadcast::{BroadcastGroup, BroadcastStats, RoomJoin, RoomManager};
pub use client::WsTransport;
pub use clock::{Clock, Debouncer, ManualClock, SystemClock};
pub use config::CollabConfig;
pub use driver::{drive, SessionHandle};
pub use lock::{LockConflict, LockCoordinator};
pub use presence::{PresenceMessage, PresencePatch, PresenceRecord, PresenceStore, Vec2};
pub use protocol::{CollabEvent, Envelope, PeerInfo, ProtocolError};
pub use server::{RelayConfig, RelayError, RelayServer, RelayStats};
pub use session::{
    CollabSession, LockOutcome, MutationOutcome, SessionServices, TeardownReport, TickReport,
};
pub use storage::{
    LayoutMetadata, LayoutPersistence, MemoryLayoutStore, RocksLayoutStore, StoreConfig,
    StoreError,
};
pub use store::EditorStore;
pub use sync::{SyncEngine, SyncState, SyncStats};
pub use transport::{Inbox, LocalHub, LocalTransport, Transport, TransportError};
