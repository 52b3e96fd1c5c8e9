//! Room-scoped fan-out.
//!
//! Every room shares one tokio broadcast channel of pre-encoded envelopes.
//! The group also remembers the latest `LAYOUT_SYNC` frame so a peer that
//! joins late starts from the current layout instead of waiting for the
//! next edit. The group never interprets layouts: it is not an authority.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};

use sitekit_core::RoomId;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{Envelope, PeerInfo, ProtocolError};

pub type Frame = Arc<Vec<u8>>;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub snapshots_retained: u64,
    pub active_peers: usize,
}

struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    snapshots_retained: AtomicU64,
}

/// Fan-out group for a single room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Frame>,
    peers: RwLock<HashMap<Uuid, PeerInfo>>,
    /// Latest layout frame. Held while sending so joiners see it either in
    /// the snapshot or in their receiver, never both out of order.
    retained: StdRwLock<Option<Frame>>,
    capacity: usize,
    stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    /// `capacity` is how many frames a slow receiver may fall behind before
    /// it starts losing them.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: RwLock::new(HashMap::new()),
            retained: StdRwLock::new(None),
            capacity,
            stats: AtomicBroadcastStats {
                messages_sent: AtomicU64::new(0),
                snapshots_retained: AtomicU64::new(0),
            },
        }
    }

    /// Register a peer. Returns its receiver and the retained layout frame.
    pub async fn add_peer(&self, info: PeerInfo) -> (broadcast::Receiver<Frame>, Option<Frame>) {
        self.peers.write().await.insert(info.connection_id, info);
        let retained = self.retained.read().unwrap_or_else(|e| e.into_inner());
        (self.sender.subscribe(), retained.clone())
    }

    pub async fn remove_peer(&self, connection_id: &Uuid) -> Option<PeerInfo> {
        self.peers.write().await.remove(connection_id)
    }

    /// Encode and fan out an envelope. Returns the number of receivers.
    pub fn broadcast(&self, envelope: &Envelope) -> Result<usize, ProtocolError> {
        let frame = Arc::new(envelope.encode()?);
        Ok(self.send_frame(frame, envelope.is_layout_sync()))
    }

    /// Fan out an already-encoded frame (relay fast path).
    pub fn broadcast_raw(&self, frame: Frame, is_layout_sync: bool) -> usize {
        self.send_frame(frame, is_layout_sync)
    }

    fn send_frame(&self, frame: Frame, is_layout_sync: bool) -> usize {
        let count = if is_layout_sync {
            let mut retained = self.retained.write().unwrap_or_else(|e| e.into_inner());
            *retained = Some(frame.clone());
            self.stats.snapshots_retained.fetch_add(1, Ordering::Relaxed);
            self.sender.send(frame).unwrap_or(0)
        } else {
            self.sender.send(frame).unwrap_or(0)
        };
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub fn retained(&self) -> Option<Frame> {
        self.retained.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn has_peer(&self, connection_id: &Uuid) -> bool {
        self.peers.read().await.contains_key(connection_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            snapshots_retained: self.stats.snapshots_retained.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A peer's registration in a room.
pub struct RoomJoin {
    pub group: Arc<BroadcastGroup>,
    pub receiver: broadcast::Receiver<Frame>,
    /// Latest layout frame at the moment of joining.
    pub retained: Option<Frame>,
}

/// Maps room ids to broadcast groups; rooms never see each other's frames.
pub struct RoomManager {
    rooms: RwLock<HashMap<RoomId, Arc<BroadcastGroup>>>,
    default_capacity: usize,
}

impl RoomManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    pub async fn get_or_create(&self, room: &RoomId) -> Arc<BroadcastGroup> {
        {
            let rooms = self.rooms.read().await;
            if let Some(group) = rooms.get(room) {
                return group.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        if let Some(group) = rooms.get(room) {
            return group.clone();
        }
        let group = Arc::new(BroadcastGroup::new(self.default_capacity));
        rooms.insert(room.clone(), group.clone());
        log::debug!("Created room {room}");
        group
    }

    /// Resolve the room and register `info` under the rooms write lock, so
    /// [`remove_if_empty`](Self::remove_if_empty) cannot drop the group
    /// between lookup and registration. `None` when the room already holds
    /// `max_peers`.
    pub async fn join_room(
        &self,
        room: &RoomId,
        info: PeerInfo,
        max_peers: usize,
    ) -> Option<RoomJoin> {
        let mut rooms = self.rooms.write().await;
        let group = match rooms.get(room) {
            Some(group) => group.clone(),
            None => {
                let group = Arc::new(BroadcastGroup::new(self.default_capacity));
                rooms.insert(room.clone(), group.clone());
                log::debug!("Created room {room}");
                group
            }
        };

        let count = group.peer_count().await;
        if count >= max_peers {
            if count == 0 {
                rooms.remove(room);
            }
            return None;
        }
        let (receiver, retained) = group.add_peer(info).await;
        Some(RoomJoin {
            group,
            receiver,
            retained,
        })
    }

    pub async fn get(&self, room: &RoomId) -> Option<Arc<BroadcastGroup>> {
        self.rooms.read().await.get(room).cloned()
    }

    /// Drop the room (and its retained snapshot) once nobody is left.
    /// Membership is re-read under the rooms write lock, which
    /// [`join_room`](Self::join_room) also holds while registering.
    pub async fn remove_if_empty(&self, room: &RoomId) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(group) = rooms.get(room) {
            if group.peer_count().await == 0 {
                rooms.remove(room);
                log::info!("Room {room} removed (empty)");
                return true;
            }
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_rooms(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceMessage;
    use sitekit_core::LayoutDocument;

    fn room(page: &str) -> RoomId {
        RoomId::new("acme", "shop", page).unwrap()
    }

    fn peer(name: &str) -> PeerInfo {
        PeerInfo::new(Uuid::new_v4(), name.to_lowercase(), name)
    }

    #[tokio::test]
    async fn test_add_remove_peer() {
        let group = BroadcastGroup::new(16);
        let alice = peer("Alice");
        let id = alice.connection_id;

        let (_rx, retained) = group.add_peer(alice).await;
        assert!(retained.is_none());
        assert!(group.has_peer(&id).await);

        group.remove_peer(&id).await;
        assert_eq!(group.peer_count().await, 0);
    }

    #[tokio::test]
    async fn test_fan_out_includes_sender() {
        let group = BroadcastGroup::new(16);
        let alice = peer("Alice");
        let (mut rx1, _) = group.add_peer(alice.clone()).await;
        let (mut rx2, _) = group.add_peer(peer("Bob")).await;

        let env = Envelope::presence(room("home"), alice.connection_id, 0, PresenceMessage::Leave {
            connection_id: alice.connection_id,
        });
        assert_eq!(group.broadcast(&env).unwrap(), 2);

        // filtering own frames is the receiver's job
        assert_eq!(Envelope::decode(&rx1.recv().await.unwrap()).unwrap(), env);
        assert_eq!(Envelope::decode(&rx2.recv().await.unwrap()).unwrap(), env);
    }

    #[tokio::test]
    async fn test_layout_snapshot_retained_for_late_joiner() {
        let group = BroadcastGroup::new(16);
        let env = Envelope::layout_sync(room("home"), Uuid::new_v4(), 1, LayoutDocument::new());
        group.broadcast(&env).unwrap();

        let presence = Envelope::presence(room("home"), Uuid::new_v4(), 2, PresenceMessage::Leave {
            connection_id: Uuid::nil(),
        });
        group.broadcast(&presence).unwrap();

        let (_rx, retained) = group.add_peer(peer("Late")).await;
        let retained = Envelope::decode(&retained.unwrap()).unwrap();
        assert_eq!(retained, env);

        let stats = group.stats().await;
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.snapshots_retained, 1);
    }

    #[tokio::test]
    async fn test_room_manager_get_or_create() {
        let manager = RoomManager::new(16);
        let a = manager.get_or_create(&room("home")).await;
        let b = manager.get_or_create(&room("home")).await;
        assert!(Arc::ptr_eq(&a, &b));

        manager.get_or_create(&room("about")).await;
        assert_eq!(manager.room_count().await, 2);
        assert!(manager.active_rooms().await.contains(&room("about")));
    }

    #[tokio::test]
    async fn test_room_manager_cleanup() {
        let manager = RoomManager::new(16);
        let group = manager.get_or_create(&room("home")).await;
        let alice = peer("Alice");
        let id = alice.connection_id;
        let _ = group.add_peer(alice).await;

        assert!(!manager.remove_if_empty(&room("home")).await);
        group.remove_peer(&id).await;
        assert!(manager.remove_if_empty(&room("home")).await);
        assert!(manager.get(&room("home")).await.is_none());
    }

    #[tokio::test]
    async fn test_join_room_respects_capacity() {
        let manager = RoomManager::new(16);
        assert!(manager.join_room(&room("home"), peer("Alice"), 1).await.is_some());
        assert!(manager.join_room(&room("home"), peer("Bob"), 1).await.is_none());
        assert_eq!(manager.get(&room("home")).await.unwrap().peer_count().await, 1);

        // a refused join never leaves an empty room behind
        assert!(manager.join_room(&room("about"), peer("Carol"), 0).await.is_none());
        assert!(manager.get(&room("about")).await.is_none());
    }

    #[tokio::test]
    async fn test_join_after_last_peer_leaves_keeps_room_whole() {
        let manager = RoomManager::new(16);
        let alice = peer("Alice");
        let alice_id = alice.connection_id;
        let first = manager.join_room(&room("home"), alice, 10).await.unwrap();

        // Alice detaches, Bob joins before the cleanup runs
        first.group.remove_peer(&alice_id).await;
        let bob = manager.join_room(&room("home"), peer("Bob"), 10).await.unwrap();
        assert!(Arc::ptr_eq(&first.group, &bob.group));
        assert!(!manager.remove_if_empty(&room("home")).await);

        let carol = peer("Carol");
        let carol_id = carol.connection_id;
        let later = manager.join_room(&room("home"), carol, 10).await.unwrap();
        assert!(Arc::ptr_eq(&bob.group, &later.group));

        let mut bob_rx = bob.receiver;
        let env = Envelope::presence(room("home"), carol_id, 0, PresenceMessage::Leave {
            connection_id: carol_id,
        });
        later.group.broadcast(&env).unwrap();
        assert_eq!(Envelope::decode(&bob_rx.recv().await.unwrap()).unwrap(), env);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_leave_and_join_share_one_group() {
        let manager = Arc::new(RoomManager::new(16));
        for _ in 0..200 {
            let leaver = peer("Leaver");
            let leaver_id = leaver.connection_id;
            let joined = manager.join_room(&room("home"), leaver, 10).await.unwrap();

            let leave = {
                let manager = manager.clone();
                let group = joined.group.clone();
                tokio::spawn(async move {
                    group.remove_peer(&leaver_id).await;
                    manager.remove_if_empty(&room("home")).await;
                })
            };
            let join = {
                let manager = manager.clone();
                tokio::spawn(async move { manager.join_room(&room("home"), peer("Joiner"), 10).await })
            };
            leave.await.unwrap();
            let joiner = join.await.unwrap().unwrap();

            let current = manager.get(&room("home")).await.unwrap();
            assert!(Arc::ptr_eq(&current, &joiner.group));
            assert_eq!(current.peer_count().await, 1);

            // reset for the next round
            for p in current.peers().await {
                current.remove_peer(&p.connection_id).await;
            }
            manager.remove_if_empty(&room("home")).await;
        }
    }
}
