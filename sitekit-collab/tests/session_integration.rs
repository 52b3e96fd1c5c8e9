//! Multi-editor sessions over the in-process hub, with real timers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sitekit_collab::{
    drive, CollabConfig, CollabSession, Envelope, LayoutPersistence, LocalHub, LockOutcome,
    MemoryLayoutStore, MutationOutcome, PeerInfo, PresenceMessage, PresenceRecord, SessionHandle,
    SessionServices, SystemClock, TeardownReport, Transport,
};
use sitekit_core::{Block, BlockId, Identity, LayoutDocument, Page, Role, RoomId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

struct Editor {
    handle: Arc<SessionHandle>,
    stop: watch::Sender<bool>,
    task: JoinHandle<TeardownReport>,
}

impl Editor {
    async fn join(
        hub: &Arc<LocalHub>,
        persistence: &Arc<MemoryLayoutStore>,
        identity: Identity,
        config: CollabConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        let (transport, inbox) = hub
            .join(&room(), PeerInfo::new(id, identity.user_id.clone(), identity.name.clone()))
            .await
            .unwrap();
        let session = CollabSession::join(
            room(),
            identity,
            id,
            SessionServices {
                transport: Arc::new(transport),
                persistence: persistence.clone(),
                clock: Arc::new(SystemClock::new()),
            },
            config,
        )
        .unwrap();
        let handle = SessionHandle::new(session);
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(drive(handle.clone(), inbox, stop_rx));
        Self { handle, stop, task }
    }

    async fn leave(self) -> TeardownReport {
        self.stop.send(true).unwrap();
        self.task.await.unwrap()
    }
}

fn room() -> RoomId {
    RoomId::new("acme", "shop", "home").unwrap()
}

fn seeded_store() -> Arc<MemoryLayoutStore> {
    let store = Arc::new(MemoryLayoutStore::new());
    let layout = LayoutDocument::with_pages(vec![Page::new("home", "", "Home")
        .block(
            Block::with_id("hero-1", "container")
                .child(Block::with_id("title", "heading").prop("text", "Hello")),
        )
        .block(Block::with_id("footer-1", "footer"))]);
    store.save(&room().to_string(), &layout).unwrap();
    store
}

async fn eventually<F>(handle: &SessionHandle, check: F) -> bool
where
    F: Fn(&CollabSession) -> bool,
{
    for _ in 0..200 {
        if check(&*handle.lock().await) {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_three_editors_converge_on_sequential_edits() {
    let hub = Arc::new(LocalHub::new(64, 10));
    let store = seeded_store();
    let a = Editor::join(&hub, &store, Identity::editor("a", "Ada"), CollabConfig::default()).await;
    let b = Editor::join(&hub, &store, Identity::editor("b", "Bo"), CollabConfig::default()).await;
    let c = Editor::join(&hub, &store, Identity::editor("c", "Cy"), CollabConfig::default()).await;

    for e in [&a, &b, &c] {
        assert!(eventually(&e.handle, |s| s.others().len() == 2).await);
    }

    let title = BlockId::from("title");
    let outcome = a
        .handle
        .with(|s| {
            s.update_block_props(&title, serde_json::from_value(json!({"text": "Sale"})).unwrap())
        })
        .await;
    assert_eq!(outcome, MutationOutcome::Applied);
    let expected = a.handle.lock().await.layout().clone();
    assert!(eventually(&b.handle, |s| s.layout() == &expected).await);
    assert!(eventually(&c.handle, |s| s.layout() == &expected).await);

    // next edit starts from the converged state
    let outcome = c
        .handle
        .with(|s| s.remove_block(&BlockId::from("footer-1")))
        .await;
    assert!(outcome.is_applied());
    let expected = c.handle.lock().await.layout().clone();
    assert!(eventually(&a.handle, |s| s.layout() == &expected).await);
    assert!(eventually(&b.handle, |s| s.layout() == &expected).await);
    assert_eq!(expected.block_count(), 2);

    // remote snapshots are never rebroadcast
    assert_eq!(b.handle.lock().await.sync_stats().broadcasts, 0);
}

#[tokio::test]
async fn test_lock_guards_subtree_across_editors() {
    let hub = Arc::new(LocalHub::new(64, 10));
    let store = seeded_store();
    let a = Editor::join(&hub, &store, Identity::editor("a", "Ada"), CollabConfig::default()).await;
    let b = Editor::join(&hub, &store, Identity::editor("b", "Bo"), CollabConfig::default()).await;
    assert!(eventually(&b.handle, |s| s.others().len() == 1).await);

    let title = BlockId::from("title");
    assert_eq!(a.handle.with(|s| s.try_lock(&title)).await, LockOutcome::Acquired);
    assert!(eventually(&b.handle, |s| s.lock_holder(&title).is_some()).await);

    // removing the parent would take the locked child with it
    let outcome = b
        .handle
        .with(|s| s.remove_block(&BlockId::from("hero-1")))
        .await;
    assert!(matches!(outcome, MutationOutcome::Locked(ref c) if c.holder_name == "Ada"));

    a.handle.with(|s| s.release_lock()).await;
    assert!(eventually(&b.handle, |s| s.lock_holder(&title).is_none()).await);
    let outcome = b
        .handle
        .with(|s| s.remove_block(&BlockId::from("hero-1")))
        .await;
    assert!(outcome.is_applied());
    assert!(eventually(&a.handle, |s| !s.layout().contains_block(&title)).await);
}

#[tokio::test]
async fn test_viewer_follows_but_cannot_edit() {
    let hub = Arc::new(LocalHub::new(64, 10));
    let store = seeded_store();
    let a = Editor::join(&hub, &store, Identity::editor("a", "Ada"), CollabConfig::default()).await;
    let v = Editor::join(
        &hub,
        &store,
        Identity::new("v", "Vi", Role::Viewer),
        CollabConfig::default(),
    )
    .await;
    assert!(eventually(&a.handle, |s| s.others().len() == 1).await);

    let title = BlockId::from("title");
    assert_eq!(v.handle.with(|s| s.try_lock(&title)).await, LockOutcome::ReadOnly);
    assert_eq!(
        v.handle.with(|s| s.remove_block(&title)).await,
        MutationOutcome::ReadOnly
    );

    assert!(a.handle.with(|s| s.remove_block(&title)).await.is_applied());
    assert!(eventually(&v.handle, |s| !s.layout().contains_block(&title)).await);
}

#[tokio::test]
async fn test_leaving_editor_disappears_and_saves() {
    let hub = Arc::new(LocalHub::new(64, 10));
    let store = seeded_store();
    let a = Editor::join(&hub, &store, Identity::editor("a", "Ada"), CollabConfig::default()).await;
    let b = Editor::join(&hub, &store, Identity::editor("b", "Bo"), CollabConfig::default()).await;
    assert!(eventually(&b.handle, |s| s.others().len() == 1).await);
    let saves_before = store.save_count();

    a.handle
        .with(|s| s.insert_block("home", None, 0, Block::with_id("banner", "text")))
        .await;
    let a_handle = a.handle.clone();
    let report = a.leave().await;
    assert!(report.saved);
    assert!(a_handle.lock().await.is_closed());
    assert_eq!(store.save_count(), saves_before + 1);
    assert!(store
        .load(&room().to_string())
        .unwrap()
        .contains_block(&BlockId::from("banner")));

    assert!(eventually(&b.handle, |s| s.others().is_empty()).await);
    assert!(eventually(&b.handle, |s| s.layout().contains_block(&BlockId::from("banner"))).await);
}

#[tokio::test]
async fn test_silent_peer_is_pruned() {
    let hub = Arc::new(LocalHub::new(64, 10));
    let store = seeded_store();
    let a = Editor::join(&hub, &store, Identity::editor("a", "Ada"), CollabConfig::for_testing())
        .await;

    // a hub member that announces itself once and then goes quiet
    let ghost = Uuid::new_v4();
    let (transport, _inbox) = hub
        .join(&room(), PeerInfo::new(ghost, "g", "Ghost"))
        .await
        .unwrap();
    let record = PresenceRecord::new(ghost, &Identity::editor("g", "Ghost"));
    transport
        .send(&Envelope::presence(room(), ghost, 0, PresenceMessage::Join { record }))
        .unwrap();

    assert!(eventually(&a.handle, |s| s.others().len() == 1).await);
    // for_testing times peers out after 300ms
    assert!(eventually(&a.handle, |s| s.others().is_empty()).await);
}
