use std::fs::OpenOptions;

use fs2::FileExt;
use pingbot::bot::relays::RelayStatsTracker;
use pingbot::mesh::MeshEvent;
use pingbot::storage::{PeerStore, PeerStoreError, Upsert, RECORD_LEN};
use tokio_test::{assert_err, assert_ok};
mod common;
use common::{chat_peer, harness, harness_with, relay};

#[test]
fn round_trip_keeps_relays_and_drops_chat_peers() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("relays.bin");

    let mut hill = relay(0x0A, "Hilltop");
    hill.flags = 0x03;
    hill.last_advert = 1_700_000_123;
    hill.out_path = Some(vec![0x11, 0x22, 0x33]);
    let valley = relay(0xB0, "Valley");

    let mut relays = RelayStatsTracker::new();
    let mut store = PeerStore::new(&path, 350);
    assert_eq!(store.on_discovered(hill.clone(), 0), Upsert::Inserted);
    assert_eq!(store.on_discovered(chat_peer(0x42, "Alice"), 0), Upsert::Inserted);
    assert_eq!(store.on_discovered(valley.clone(), 0), Upsert::Inserted);
    assert_eq!(assert_ok!(store.save(&mut relays)), 2);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 2 * RECORD_LEN as u64);

    let mut fresh_relays = RelayStatsTracker::new();
    let mut reloaded = PeerStore::new(&path, 350);
    assert_eq!(assert_ok!(reloaded.load(&mut fresh_relays)), 2);
    let peers: Vec<_> = reloaded.table().iter().cloned().collect();
    assert_eq!(peers, vec![hill, valley]);
    assert_eq!(fresh_relays.name(0x0A), "Hilltop");
    assert_eq!(fresh_relays.name(0xB0), "Valley");
    assert_eq!(fresh_relays.name(0x42), "UnknownRepeater");
}

#[test]
fn truncated_tail_is_discarded() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("relays.bin");
    let mut store = PeerStore::new(&path, 350);
    let mut relays = RelayStatsTracker::new();
    store.on_discovered(relay(1, "One"), 0);
    store.on_discovered(relay(2, "Two"), 0);
    assert_ok!(store.save(&mut relays));

    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len((RECORD_LEN + RECORD_LEN / 2) as u64).unwrap();
    drop(file);

    let mut reloaded = PeerStore::new(&path, 350);
    assert_eq!(assert_ok!(reloaded.load(&mut relays)), 1);
    assert_eq!(reloaded.table().iter().next().unwrap().name, "One");
}

#[test]
fn missing_file_is_cold_start() {
    let tmp = tempfile::tempdir().unwrap();
    let mut store = PeerStore::new(tmp.path().join("nothing.bin"), 350);
    assert_eq!(assert_ok!(store.load(&mut RelayStatsTracker::new())), 0);
    assert!(store.table().is_empty());
}

#[test]
fn full_table_rejects_new_peers() {
    let tmp = tempfile::tempdir().unwrap();
    let mut store = PeerStore::new(tmp.path().join("relays.bin"), 2);
    assert_eq!(store.on_discovered(relay(1, "A"), 0), Upsert::Inserted);
    assert_eq!(store.on_discovered(relay(2, "B"), 0), Upsert::Inserted);
    assert_eq!(store.on_discovered(relay(3, "C"), 0), Upsert::Rejected);
    // updates to known peers still go through
    assert_eq!(store.on_discovered(relay(1, "A2"), 0), Upsert::Updated);
    assert_eq!(store.table().len(), 2);
}

#[test]
fn locked_file_aborts_save() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("relays.bin");
    let mut store = PeerStore::new(&path, 350);
    let mut relays = RelayStatsTracker::new();
    store.on_discovered(relay(9, "Nine"), 0);
    assert_ok!(store.save(&mut relays));

    let holder = OpenOptions::new().write(true).open(&path).unwrap();
    holder.lock_exclusive().unwrap();
    store.on_discovered(relay(10, "Ten"), 5);
    match assert_err!(store.save(&mut relays)) {
        PeerStoreError::Locked(p) => assert!(p.ends_with("relays.bin")),
        other => panic!("Expected Locked, got {:?}", other),
    }
    // the earlier save is still intact and the change is still pending
    assert_eq!(std::fs::metadata(&path).unwrap().len(), RECORD_LEN as u64);
    assert!(store.is_dirty());
    FileExt::unlock(&holder).unwrap();
}

#[tokio::test]
async fn discovery_is_saved_after_delay() {
    let mut h = harness();
    h.bot
        .handle_mesh_event(MeshEvent::PeerDiscovered(relay(0x33, "Tower")))
        .await;
    assert!(h.bot.peers().is_dirty());
    assert_eq!(h.bot.engine().relays().name(0x33), "Tower");

    h.clock.advance(4_000);
    h.bot.tick();
    assert!(h.bot.peers().is_dirty());

    h.clock.advance(1_000);
    h.bot.tick();
    assert!(!h.bot.peers().is_dirty());
    let len = std::fs::metadata(h.bot.peers().path()).unwrap().len();
    assert_eq!(len, RECORD_LEN as u64);
}

#[tokio::test]
async fn chat_peers_do_not_trigger_saves() {
    let mut h = harness();
    h.bot
        .handle_mesh_event(MeshEvent::PeerDiscovered(chat_peer(0x44, "Bob")))
        .await;
    assert!(!h.bot.peers().is_dirty());
    assert_eq!(h.bot.peers().table().len(), 1);
}

#[tokio::test]
async fn path_update_marks_relay_dirty() {
    let mut h = harness();
    let mut tower = relay(0x33, "Tower");
    h.bot
        .handle_mesh_event(MeshEvent::PeerDiscovered(tower.clone()))
        .await;
    h.bot.handle_console_line("reboot");
    assert!(!h.bot.peers().is_dirty());

    tower.out_path = Some(vec![0x01, 0x02]);
    h.bot
        .handle_mesh_event(MeshEvent::PeerPathUpdated(tower.clone()))
        .await;
    assert!(h.bot.peers().is_dirty());
    let stored = h.bot.peers().table().get(&tower.public_key).unwrap();
    assert_eq!(stored.out_path, Some(vec![0x01, 0x02]));
}

#[tokio::test]
async fn reboot_restores_names_from_disk() {
    let mut h = harness();
    h.bot
        .handle_mesh_event(MeshEvent::PeerDiscovered(relay(0x0A, "Hilltop")))
        .await;
    h.bot.handle_console_line("reboot");
    assert_eq!(h.bot.engine().relays().name(0x0A), "Hilltop");
    assert_eq!(h.bot.peers().table().len(), 1);
}

#[tokio::test]
async fn persistence_off_never_writes() {
    let mut h = harness_with(|c| c.reply.enable_persistence = false);
    h.bot
        .handle_mesh_event(MeshEvent::PeerDiscovered(relay(0x0A, "Hilltop")))
        .await;
    h.clock.advance(60_000);
    h.bot.tick();
    h.bot.handle_console_line("shutdown");
    assert!(!h.bot.peers().path().exists());
}
