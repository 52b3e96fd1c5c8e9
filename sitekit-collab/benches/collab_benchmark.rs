use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use sitekit_collab::broadcast::BroadcastGroup;
use sitekit_collab::presence::{PresenceMessage, PresencePatch, PresenceRecord, PresenceStore, Vec2};
use sitekit_collab::protocol::{Envelope, PeerInfo};
use sitekit_collab::storage::{RocksLayoutStore, StoreConfig};
use sitekit_collab::lock::LockCoordinator;
use sitekit_core::{Block, BlockId, Identity, LayoutDocument, Page, RoomId};
use uuid::Uuid;

/// A page with `sections` containers of four blocks each.
fn sample_layout(sections: usize) -> LayoutDocument {
    let mut page = Page::new("home", "", "Home");
    for i in 0..sections {
        page = page.block(
            Block::with_id(format!("section-{i}"), "container")
                .style("padding", 24)
                .child(Block::with_id(format!("title-{i}"), "heading").prop("text", "Headline"))
                .child(Block::with_id(format!("body-{i}"), "text").prop("text", "Lorem ipsum dolor sit amet"))
                .child(Block::with_id(format!("cta-{i}"), "button").prop("label", "Buy")),
        );
    }
    LayoutDocument::with_pages(vec![page])
}

fn room() -> RoomId {
    "acme:shop:home".parse().unwrap()
}

fn bench_layout_sync_encode(c: &mut Criterion) {
    let sender = Uuid::new_v4();
    let layout = sample_layout(50);

    c.bench_function("layout_sync_encode_200_blocks", |b| {
        b.iter(|| {
            let env = Envelope::layout_sync(room(), black_box(sender), 1, black_box(layout.clone()));
            black_box(env.encode().unwrap());
        })
    });
}

fn bench_layout_sync_decode(c: &mut Criterion) {
    let encoded = Envelope::layout_sync(room(), Uuid::new_v4(), 1, sample_layout(50))
        .encode()
        .unwrap();

    c.bench_function("layout_sync_decode_200_blocks", |b| {
        b.iter(|| {
            black_box(Envelope::decode(black_box(&encoded)).unwrap());
        })
    });
}

fn bench_presence_encode(c: &mut Criterion) {
    let id = Uuid::new_v4();
    let mut record = PresenceRecord::new(id, &Identity::editor("u1", "Ada"));
    record.cursor = Some(Vec2::new(120.0, 340.0));

    c.bench_function("presence_update_encode", |b| {
        b.iter(|| {
            let env = Envelope::presence(
                room(),
                id,
                7,
                PresenceMessage::Update {
                    record: black_box(record.clone()),
                },
            );
            black_box(env.encode().unwrap());
        })
    });
}

fn bench_presence_apply_remote(c: &mut Criterion) {
    let mut store = PresenceStore::new(Uuid::new_v4(), &Identity::editor("me", "Me"));
    let peers: Vec<PresenceMessage> = (0..20)
        .map(|i| {
            let id = Uuid::new_v4();
            let mut record = PresenceRecord::new(id, &Identity::editor(format!("u{i}"), "Peer"));
            record.cursor = Some(Vec2::new(i as f32, i as f32));
            PresenceMessage::Update { record }
        })
        .collect();

    c.bench_function("presence_apply_20_peers", |b| {
        let mut now = 0u64;
        b.iter(|| {
            now += 1;
            for msg in &peers {
                black_box(store.apply_remote(black_box(msg), now));
            }
        })
    });
}

fn bench_lock_check(c: &mut Criterion) {
    let mut store = PresenceStore::new(Uuid::new_v4(), &Identity::editor("me", "Me"));
    for i in 0..20 {
        let id = Uuid::new_v4();
        let mut record = PresenceRecord::new(id, &Identity::editor(format!("u{i}"), "Peer"));
        record.locked_block_id = Some(BlockId::new(format!("title-{i}")));
        store.apply_remote(&PresenceMessage::Join { record }, 0);
    }
    let free = BlockId::from("body-3");

    c.bench_function("lock_check_20_peers", |b| {
        b.iter(|| {
            black_box(LockCoordinator::check(&store, black_box(&free)).is_ok());
        })
    });
}

fn bench_cursor_update(c: &mut Criterion) {
    let mut store = PresenceStore::new(Uuid::new_v4(), &Identity::editor("me", "Me"));

    c.bench_function("presence_cursor_update", |b| {
        let mut x = 0.0f32;
        b.iter(|| {
            x += 1.0;
            black_box(store.update_presence(PresencePatch::default().cursor(Some(Vec2::new(x, 10.0)))));
        })
    });
}

fn bench_broadcast_fanout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let group = BroadcastGroup::new(1024);
    let receivers: Vec<_> = rt.block_on(async {
        let mut rxs = Vec::new();
        for i in 0..10 {
            let (rx, _) = group
                .add_peer(PeerInfo::new(Uuid::new_v4(), format!("u{i}"), "Peer"))
                .await;
            rxs.push(rx);
        }
        rxs
    });
    let env = Envelope::layout_sync(room(), Uuid::new_v4(), 1, sample_layout(10));

    c.bench_function("broadcast_layout_10_peers", |b| {
        b.iter(|| {
            black_box(group.broadcast(black_box(&env)).unwrap());
        })
    });
    drop(receivers);
}

fn bench_rocks_save_load(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let store = RocksLayoutStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    let layout = sample_layout(50);

    c.bench_function("rocks_save_200_blocks", |b| {
        b.iter(|| {
            black_box(store.save_layout("acme:shop:home", black_box(&layout)).unwrap());
        })
    });

    c.bench_function("rocks_load_200_blocks", |b| {
        b.iter(|| {
            black_box(store.load_layout(black_box("acme:shop:home")).unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_layout_sync_encode,
    bench_layout_sync_decode,
    bench_presence_encode,
    bench_presence_apply_remote,
    bench_lock_check,
    bench_cursor_update,
    bench_broadcast_fanout,
    bench_rocks_save_load,
);
criterion_main!(benches);
