//! End-to-end engine tests driven through relay events.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::broadcast;

use super::bridge::RelayBridge;
use super::cursor;
use super::engine::{EngineConfig, SyncEngine, SyncEvent};
use super::error::SyncError;
use super::identity::Identity;
use super::protocol::{RelayEvent, RelayRequest};
use super::readiness::Channel;
use super::record::{SyncAction, SyncCategory};
use super::seed::{SeedStorage, SyncSeed, SEED_LEN};
use super::testing::RecordingBridge;
use crate::db::test_support::test_store;
use crate::db::Store;
use crate::models::{NewBookmark, NewDevice, ObjectId};

struct Harness {
    engine: Arc<SyncEngine<RecordingBridge>>,
    bridge: Arc<RecordingBridge>,
    store: Store,
    identity: Identity,
    _temp_dir: TempDir,
}

fn test_config() -> EngineConfig {
    EngineConfig {
        fetch_interval: Duration::from_secs(3600),
        pairing_timeout: Duration::from_millis(50),
        server_url: "https://sync.example".to_string(),
        ..EngineConfig::default()
    }
}

async fn harness_with(config: EngineConfig) -> Harness {
    let ctx = test_store().await;
    let seeds = SeedStorage::new(ctx.temp_dir.path().join("data"));
    let identity = Identity::new(seeds, ctx.store.clone());
    let bridge = Arc::new(RecordingBridge::new());
    let engine = SyncEngine::new(bridge.clone(), ctx.store.clone(), identity.clone(), config);

    Harness {
        engine,
        bridge,
        store: ctx.store,
        identity,
        _temp_dir: ctx.temp_dir,
    }
}

async fn harness() -> Harness {
    harness_with(test_config()).await
}

/// A harness whose device already holds a seed and has started the bridge.
async fn joined_harness(config: EngineConfig) -> Harness {
    let h = harness_with(config).await;
    h.engine
        .initialize_sync(Some(&[9; SEED_LEN]), Some("phone-1"))
        .await
        .unwrap();
    h
}

async fn make_ready(h: &Harness) {
    for channel in Channel::ALL {
        h.engine
            .handle_event(RelayEvent::ChannelReady(channel))
            .await
            .unwrap();
    }
}

async fn set_cursor(h: &Harness, value: i64) {
    h.store
        .preferences()
        .set_i64(cursor::BOOKMARKS_CURSOR_KEY, value)
        .await
        .unwrap();
}

async fn load_cursor(h: &Harness) -> i64 {
    cursor::load(&h.store.preferences()).await.unwrap()
}

fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn bookmark_record(id: &[u8], action: SyncAction, title: &str, ts: i64) -> Value {
    json!({
        "objectId": id,
        "action": action.code(),
        "objectData": "bookmark",
        "bookmark": { "site": { "title": title, "location": format!("https://{}.example", title) } },
        "syncTimestamp": ts
    })
}

fn oid(bytes: &[u8]) -> ObjectId {
    ObjectId::from_bytes(bytes.to_vec()).unwrap()
}

fn fetch_starts(bridge: &RecordingBridge) -> Vec<i64> {
    bridge
        .sent()
        .into_iter()
        .filter_map(|request| match request {
            RelayRequest::FetchSyncRecords { start_at, .. } => Some(start_at),
            _ => None,
        })
        .collect()
}

/// Runs a full fetch round: existing-objects request then the resolved batch.
async fn deliver(h: &Harness, category: SyncCategory, records: Vec<Value>, truncated: bool) {
    h.engine
        .handle_event(RelayEvent::GetExistingObjects {
            category,
            records: records.clone(),
            last_record_timestamp: None,
            is_truncated: truncated,
        })
        .await
        .unwrap();
    h.engine
        .handle_event(RelayEvent::ResolvedSyncRecords { category, records })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_group_then_save_init_data() {
    let h = harness().await;

    assert!(h.engine.initialize_new_group("phone-1").await.unwrap());
    let launches = h.bridge.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].fingerprint, None);
    assert_eq!(launches[0].device_name, "phone-1");

    let seed: Vec<u8> = (0..32).collect();
    h.engine
        .handle_event(RelayEvent::SaveInitData {
            seed: Some(seed.clone()),
            device_id: Some(vec![7]),
        })
        .await
        .unwrap();

    assert!(h.engine.is_in_group());
    let stored = h.identity.seed().unwrap().unwrap();
    assert_eq!(stored.as_bytes().len(), 32);
    assert_eq!(stored.as_bytes().to_vec(), seed);

    let me = h.store.devices().current().await.unwrap().unwrap();
    assert_eq!(me.name, "phone-1");
    assert_eq!(me.device_id.unwrap().as_bytes(), &[7]);

    assert!(!h.engine.initialize_new_group("again").await.unwrap());
}

#[tokio::test]
async fn test_initialize_without_seed_stays_offline() {
    let h = harness().await;
    h.engine.initialize_sync(None, Some("phone-1")).await.unwrap();

    assert!(!h.engine.is_in_group());
    assert!(h.bridge.launches().is_empty());
}

#[tokio::test]
async fn test_initialize_rejects_short_seed() {
    let h = harness().await;
    let result = h.engine.initialize_sync(Some(&[1, 2, 3]), None).await;

    assert!(matches!(result, Err(SyncError::Seed(_))));
    assert!(!h.engine.is_in_group());
}

#[tokio::test]
async fn test_get_init_data_answers_with_identity() {
    let h = joined_harness(test_config()).await;
    assert_eq!(
        h.bridge.launches()[0].fingerprint,
        Some(SyncSeed::try_from(&[9; SEED_LEN][..]).unwrap().fingerprint())
    );

    h.engine.handle_event(RelayEvent::GetInitData).await.unwrap();

    match h.bridge.sent().last().unwrap() {
        RelayRequest::GotInitData {
            seed,
            device_name,
            config,
            ..
        } => {
            assert_eq!(seed.as_ref().unwrap().as_bytes(), &[9; SEED_LEN]);
            assert_eq!(device_name.as_deref(), Some("phone-1"));
            assert_eq!(config.api_version, "0");
            assert_eq!(config.server_url, "https://sync.example");
        }
        other => panic!("unexpected request {:?}", other),
    }
}

#[tokio::test]
async fn test_ready_announces_device_and_fetches_devices() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 1000).await;
    let mut events = h.engine.subscribe();

    for channel in &Channel::ALL[..7] {
        h.engine
            .handle_event(RelayEvent::ChannelReady(*channel))
            .await
            .unwrap();
    }
    assert!(!h.engine.is_ready());
    assert_eq!(h.engine.pending_channels(), vec![Channel::DeleteCategory]);
    assert!(h.bridge.sent().is_empty());

    h.engine
        .handle_event(RelayEvent::ChannelReady(Channel::DeleteCategory))
        .await
        .unwrap();

    assert!(h.engine.is_ready());
    assert_eq!(drain(&mut events), vec![SyncEvent::Ready]);
    assert_eq!(
        h.bridge.sent_names(),
        vec!["send-sync-records", "fetch-sync-devices"]
    );
    assert!(h.store.devices().current().await.unwrap().unwrap().synced);

    // A repeated acknowledgement does not fire the latch again.
    h.engine
        .handle_event(RelayEvent::ChannelReady(Channel::SyncReady))
        .await
        .unwrap();
    assert_eq!(h.bridge.sent().len(), 2);
}

#[tokio::test]
async fn test_first_ready_uploads_existing_bookmarks() {
    let h = joined_harness(test_config()).await;
    let repo = h.store.bookmarks();
    repo.create(&NewBookmark::new("Rust").with_url("https://rust-lang.org"))
        .await
        .unwrap();
    repo.create(&NewBookmark::folder("Reading")).await.unwrap();

    make_ready(&h).await;

    let uploaded = h
        .bridge
        .sent()
        .into_iter()
        .find_map(|request| match request {
            RelayRequest::SendSyncRecords {
                category: SyncCategory::Bookmarks,
                records,
            } => Some(records),
            _ => None,
        })
        .unwrap();
    assert_eq!(uploaded.len(), 2);
    assert!(uploaded.iter().all(|r| r.action == SyncAction::Create));
}

#[tokio::test]
async fn test_incremental_fetch_advances_cursor() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 1000).await;
    h.store
        .bookmarks()
        .create(&NewBookmark::new("old").with_object_id(oid(&[1])))
        .await
        .unwrap();
    make_ready(&h).await;
    h.bridge.take_sent();
    let mut events = h.engine.subscribe();

    h.engine.fetch(SyncCategory::Bookmarks).await.unwrap();
    assert_eq!(fetch_starts(&h.bridge), vec![1000]);

    let records = vec![
        bookmark_record(&[2], SyncAction::Create, "fresh", 1005),
        bookmark_record(&[1], SyncAction::Update, "renamed", 1010),
    ];
    h.engine
        .handle_event(RelayEvent::GetExistingObjects {
            category: SyncCategory::Bookmarks,
            records: records.clone(),
            last_record_timestamp: None,
            is_truncated: false,
        })
        .await
        .unwrap();

    match h.bridge.sent().last().unwrap() {
        RelayRequest::ResolveSyncRecords {
            records_and_existing_objects,
            ..
        } => {
            assert_eq!(records_and_existing_objects.len(), 2);
            assert!(records_and_existing_objects[0].1.is_none());
            assert_eq!(
                records_and_existing_objects[1].1.as_ref().unwrap().object_id,
                oid(&[1])
            );
        }
        other => panic!("unexpected request {:?}", other),
    }

    h.engine
        .handle_event(RelayEvent::ResolvedSyncRecords {
            category: SyncCategory::Bookmarks,
            records,
        })
        .await
        .unwrap();

    assert_eq!(load_cursor(&h).await, 1011);
    let repo = h.store.bookmarks();
    assert_eq!(repo.get_by_object_id(&oid(&[1])).await.unwrap().unwrap().title, "renamed");
    assert_eq!(repo.get_by_object_id(&oid(&[2])).await.unwrap().unwrap().title, "fresh");
    assert_eq!(
        drain(&mut events),
        vec![SyncEvent::RecordsApplied {
            category: SyncCategory::Bookmarks,
            created: 1,
            updated: 1,
            deleted: 0,
        }]
    );
}

#[tokio::test]
async fn test_cursor_never_moves_backwards() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 5000).await;
    make_ready(&h).await;

    deliver(
        &h,
        SyncCategory::Bookmarks,
        vec![bookmark_record(&[1], SyncAction::Create, "late", 1200)],
        false,
    )
    .await;
    assert_eq!(load_cursor(&h).await, 5000);

    deliver(
        &h,
        SyncCategory::Bookmarks,
        vec![bookmark_record(&[2], SyncAction::Create, "new", 7000)],
        false,
    )
    .await;
    assert_eq!(load_cursor(&h).await, 7001);
}

#[tokio::test]
async fn test_delete_for_unknown_id_is_noop() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 1000).await;
    make_ready(&h).await;

    let delete = json!({ "objectId": [4, 4], "action": 2, "syncTimestamp": 1100 });
    deliver(&h, SyncCategory::Bookmarks, vec![delete], false).await;

    assert!(h.store.bookmarks().list().await.unwrap().is_empty());
    assert_eq!(load_cursor(&h).await, 1101);
}

#[tokio::test]
async fn test_truncated_page_triggers_follow_up_fetch() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 1000).await;
    make_ready(&h).await;
    h.bridge.take_sent();

    h.engine.fetch(SyncCategory::Bookmarks).await.unwrap();
    deliver(
        &h,
        SyncCategory::Bookmarks,
        vec![bookmark_record(&[1], SyncAction::Create, "page-one", 1500)],
        true,
    )
    .await;

    assert_eq!(fetch_starts(&h.bridge), vec![1000, 1501]);

    // The follow-up is in flight, so another fetch is skipped.
    h.engine.fetch(SyncCategory::Bookmarks).await.unwrap();
    assert_eq!(fetch_starts(&h.bridge).len(), 2);
}

#[tokio::test]
async fn test_duplicate_create_is_last_writer_wins() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 1).await;
    make_ready(&h).await;

    deliver(
        &h,
        SyncCategory::Bookmarks,
        vec![
            bookmark_record(&[3], SyncAction::Create, "first", 10),
            bookmark_record(&[3], SyncAction::Create, "second", 20),
        ],
        false,
    )
    .await;

    let all = h.store.bookmarks().list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "second");
    assert_eq!(all[0].url.as_deref(), Some("https://second.example"));
}

#[tokio::test]
async fn test_replaying_batch_is_idempotent() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 1).await;
    h.store
        .bookmarks()
        .create(&NewBookmark::new("doomed").with_object_id(oid(&[8])))
        .await
        .unwrap();
    make_ready(&h).await;

    let batch = vec![
        bookmark_record(&[1], SyncAction::Create, "a", 100),
        bookmark_record(&[2], SyncAction::Update, "b", 110),
        json!({ "objectId": [8], "action": 2, "syncTimestamp": 120 }),
    ];

    deliver(&h, SyncCategory::Bookmarks, batch.clone(), false).await;
    let once = h.store.bookmarks().list().await.unwrap();
    let cursor_once = load_cursor(&h).await;

    deliver(&h, SyncCategory::Bookmarks, batch, false).await;
    let twice = h.store.bookmarks().list().await.unwrap();

    assert_eq!(once.len(), 2);
    assert_eq!(once, twice);
    assert_eq!(load_cursor(&h).await, cursor_once);
}

#[tokio::test]
async fn test_leave_group_resets_everything() {
    let h = joined_harness(test_config()).await;
    h.store
        .devices()
        .create(&NewDevice::remote(ObjectId::mint(), None, "laptop"))
        .await
        .unwrap();
    make_ready(&h).await;
    deliver(
        &h,
        SyncCategory::Bookmarks,
        vec![bookmark_record(&[1], SyncAction::Create, "kept", 2000)],
        false,
    )
    .await;
    assert_eq!(load_cursor(&h).await, 2001);
    let mut events = h.engine.subscribe();

    h.engine.leave_group().await.unwrap();

    assert!(!h.engine.is_in_group());
    assert!(!h.engine.is_ready());
    assert!(h.engine.devices().await.unwrap().is_empty());
    assert_eq!(load_cursor(&h).await, 0);
    assert_eq!(h.bridge.stops(), 1);
    assert_eq!(drain(&mut events), vec![SyncEvent::GroupLeft]);
    // Local bookmarks are not part of the group state.
    assert_eq!(h.store.bookmarks().list().await.unwrap().len(), 1);

    h.engine.leave_group().await.unwrap();
    assert_eq!(h.bridge.stops(), 1);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_leave_cancels_pending_waiters() {
    let h = joined_harness(test_config()).await;
    let engine = h.engine.clone();
    let pending = tokio::spawn(async move { engine.fetch(SyncCategory::Bookmarks).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.engine.leave_group().await.unwrap();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert!(fetch_starts(&h.bridge).is_empty());
}

#[tokio::test]
async fn test_waiters_run_once_ready() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 42).await;
    let engine = h.engine.clone();
    let pending = tokio::spawn(async move { engine.fetch(SyncCategory::Bookmarks).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fetch_starts(&h.bridge).is_empty());

    make_ready(&h).await;
    pending.await.unwrap().unwrap();

    assert_eq!(fetch_starts(&h.bridge), vec![42]);
}

#[tokio::test]
async fn test_resolved_records_ignored_after_leave() {
    let h = joined_harness(test_config()).await;
    make_ready(&h).await;
    h.engine.leave_group().await.unwrap();

    deliver(
        &h,
        SyncCategory::Bookmarks,
        vec![bookmark_record(&[1], SyncAction::Create, "stray", 10)],
        false,
    )
    .await;

    assert!(h.store.bookmarks().list().await.unwrap().is_empty());
    assert_eq!(load_cursor(&h).await, 0);
}

#[tokio::test]
async fn test_join_times_out_without_relay() {
    let h = harness().await;
    let mut events = h.engine.subscribe();

    let result = h.engine.join_group(&[5; SEED_LEN], "tablet").await;

    assert!(matches!(result, Err(SyncError::PairingTimeout(_))));
    assert_eq!(drain(&mut events), vec![SyncEvent::PairingFailed]);
    // The seed stays stored; the device retries pairing on the next start.
    assert!(h.engine.is_in_group());
    assert_eq!(h.bridge.launches().len(), 1);
}

#[tokio::test]
async fn test_remote_delete_of_current_device_leaves_group() {
    let h = joined_harness(test_config()).await;
    make_ready(&h).await;
    let me = h.store.devices().current().await.unwrap().unwrap();
    let mut events = h.engine.subscribe();

    let delete = json!({ "objectId": me.object_id.as_bytes(), "action": 2, "syncTimestamp": 50 });
    deliver(&h, SyncCategory::Devices, vec![delete], false).await;

    let events = drain(&mut events);
    assert!(events.contains(&SyncEvent::CurrentDeviceRemoved));
    assert!(events.contains(&SyncEvent::GroupLeft));
    assert!(!h.engine.is_in_group());
    assert!(h.engine.devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_other_device_pushes_delete() {
    let h = joined_harness(test_config()).await;
    let laptop = h
        .store
        .devices()
        .create(&NewDevice::remote(ObjectId::mint(), None, "laptop"))
        .await
        .unwrap();
    make_ready(&h).await;
    h.bridge.take_sent();

    assert!(h.engine.remove_device(&laptop.object_id).await.unwrap());
    assert!(!h.engine.remove_device(&laptop.object_id).await.unwrap());

    let deletes: Vec<_> = h
        .bridge
        .sent()
        .into_iter()
        .filter_map(|request| match request {
            RelayRequest::SendSyncRecords {
                category: SyncCategory::Devices,
                records,
            } => Some(records),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].action, SyncAction::Delete);
    assert_eq!(deletes[0].object_id, laptop.object_id);

    let names: Vec<_> = h.engine.devices().await.unwrap().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["phone-1".to_string()]);
}

#[tokio::test]
async fn test_periodic_fetch_skips_while_busy() {
    let config = EngineConfig {
        fetch_interval: Duration::from_millis(50),
        ..test_config()
    };
    let h = joined_harness(config).await;
    set_cursor(&h, 10).await;
    make_ready(&h).await;

    tokio::time::sleep(Duration::from_millis(170)).await;

    // The first tick's request is never answered, so later ticks skip.
    assert_eq!(fetch_starts(&h.bridge), vec![10]);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_send_records_outside_group_is_noop() {
    let h = harness().await;
    let bookmark = h
        .store
        .bookmarks()
        .create(&NewBookmark::new("local only"))
        .await
        .unwrap();

    h.engine
        .send_records(SyncAction::Create, &[bookmark])
        .await
        .unwrap();
    assert!(h.bridge.sent().is_empty());

    let result = h.engine.delete_remote_user().await;
    assert!(matches!(result, Err(SyncError::NotInGroup)));
}

#[tokio::test]
async fn test_bridge_failure_does_not_fail_push() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 1).await;
    make_ready(&h).await;
    h.bridge.set_fail_sends(true);

    let bookmark = h
        .store
        .bookmarks()
        .create(&NewBookmark::new("offline"))
        .await
        .unwrap();
    h.engine
        .send_records(SyncAction::Create, &[bookmark])
        .await
        .unwrap();

    // A failed fetch request does not leave the category marked busy.
    h.engine.on_foreground().await.unwrap();
    h.bridge.set_fail_sends(false);
    h.engine.on_foreground().await.unwrap();
    assert_eq!(fetch_starts(&h.bridge), vec![1]);
}

#[tokio::test]
async fn test_setup_error_is_broadcast() {
    let h = joined_harness(test_config()).await;
    let mut events = h.engine.subscribe();

    h.engine
        .handle_event(RelayEvent::SyncSetupError {
            error: "bad seed".to_string(),
        })
        .await
        .unwrap();
    h.engine
        .handle_event(RelayEvent::Unknown {
            name: "sync-banana".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(
        drain(&mut events),
        vec![SyncEvent::SetupError("bad seed".to_string())]
    );
}

#[tokio::test]
async fn test_failed_batch_keeps_cursor() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 1000).await;
    make_ready(&h).await;
    sqlx::query(
        "CREATE TRIGGER reject_poison BEFORE INSERT ON bookmarks WHEN NEW.title = 'poison' \
         BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(h.store.pool())
    .await
    .unwrap();
    h.bridge.take_sent();

    h.engine.fetch(SyncCategory::Bookmarks).await.unwrap();
    let records = vec![
        bookmark_record(&[1], SyncAction::Create, "fine", 1005),
        bookmark_record(&[2], SyncAction::Create, "poison", 1010),
    ];
    h.engine
        .handle_event(RelayEvent::GetExistingObjects {
            category: SyncCategory::Bookmarks,
            records: records.clone(),
            last_record_timestamp: Some(1010),
            is_truncated: false,
        })
        .await
        .unwrap();
    let result = h
        .engine
        .handle_event(RelayEvent::ResolvedSyncRecords {
            category: SyncCategory::Bookmarks,
            records,
        })
        .await;

    assert!(matches!(result, Err(SyncError::Database(_))));
    assert_eq!(load_cursor(&h).await, 1000);
    assert!(h.store.bookmarks().list().await.unwrap().is_empty());

    // The category is no longer marked busy, so the batch can be retried.
    h.engine.fetch(SyncCategory::Bookmarks).await.unwrap();
    assert_eq!(fetch_starts(&h.bridge), vec![1000, 1000]);
}

#[tokio::test]
async fn test_dropped_relay_reconnects_on_foreground() {
    let h = joined_harness(test_config()).await;
    set_cursor(&h, 1000).await;
    make_ready(&h).await;
    h.bridge.take_sent();
    let mut events = h.engine.subscribe();

    h.bridge.drop_connection();
    h.engine.on_foreground().await.unwrap();

    // Reconnected, and the handshake has to run again before any traffic.
    assert_eq!(h.bridge.launches().len(), 2);
    assert!(!h.engine.is_ready());
    assert!(h.bridge.sent().is_empty());

    let engine = h.engine.clone();
    let pending = tokio::spawn(async move { engine.fetch(SyncCategory::Bookmarks).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    make_ready(&h).await;
    pending.await.unwrap().unwrap();

    assert_eq!(drain(&mut events), vec![SyncEvent::Ready]);
    assert!(h.bridge.sent_names().contains(&"fetch-sync-devices"));
    assert_eq!(fetch_starts(&h.bridge), vec![1000]);

    // A live connection is left alone.
    h.engine.on_foreground().await.unwrap();
    h.engine.initialize_sync(None, None).await.unwrap();
    assert_eq!(h.bridge.launches().len(), 2);
}

#[tokio::test]
async fn test_timer_reconnects_dropped_relay() {
    let config = EngineConfig {
        fetch_interval: Duration::from_millis(50),
        ..test_config()
    };
    let h = joined_harness(config).await;
    set_cursor(&h, 10).await;
    make_ready(&h).await;
    h.bridge.take_sent();

    h.bridge.drop_connection();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(h.bridge.launches().len(), 2);
    assert!(!h.engine.is_ready());
    // No fetch goes out until the relay acknowledges again.
    assert!(fetch_starts(&h.bridge).is_empty());

    h.engine.shutdown().await;
    assert!(!h.bridge.is_connected().await);
}
