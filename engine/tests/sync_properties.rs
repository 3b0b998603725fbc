//! Behavioural properties of the sync core.
//!
//! Every test drives [`SyncStore`] through public operations only.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;
use torque_engine::{
    ContentItem, ContentKind, DiagnosticStep, Error, Identity, ItemId, SyncStore, Timestamp,
};

fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn device() -> Identity {
    Identity::new("mechanic-1", Some("shop-tablet"))
}

fn module(id: ItemId, updated: i64) -> ContentItem {
    ContentItem::new(
        id,
        ContentKind::Module,
        json!({"title": format!("Module {}", id)}),
        at(updated),
    )
}

// ============================================================================
// Versioning
// ============================================================================

#[test]
fn every_update_bumps_version_by_one() {
    let mut store = SyncStore::new();
    store.insert_item(module(1, 100)).unwrap();

    let mut last = store.get_item(ContentKind::Module, 1).unwrap().clone();
    for (i, secs) in [200, 200, 150, 300].into_iter().enumerate() {
        store
            .update_item(ContentKind::Module, 1, json!({"rev": i}), at(secs))
            .unwrap();
        let current = store.get_item(ContentKind::Module, 1).unwrap().clone();

        assert_eq!(current.version, last.version + 1);
        assert!(current.updated_at > last.updated_at);
        last = current;
    }
}

#[test]
fn update_of_unknown_item_fails() {
    let mut store = SyncStore::new();
    let err = store
        .update_item(ContentKind::DiagnosticAid, 9, json!({}), at(0))
        .unwrap_err();
    assert_eq!(
        err,
        Error::ItemNotFound {
            kind: ContentKind::DiagnosticAid,
            id: 9
        }
    );
}

// ============================================================================
// Delta
// ============================================================================

#[test]
fn delta_with_same_since_is_repeatable() {
    let mut store = SyncStore::new();
    for (id, secs) in [(1, 10), (2, 20), (3, 30)] {
        store.insert_item(module(id, secs)).unwrap();
    }

    let first = store.compute_delta(&device(), Some(at(15)), at(100));
    let second = store.compute_delta(&device(), Some(at(15)), at(101));

    assert_eq!(first, second);
    assert_eq!(store.checkpoint_count(), 2);
    assert_eq!(
        store.latest_checkpoint(&device()).unwrap().synced_at,
        at(101)
    );
}

#[test]
fn absent_since_equals_since_before_everything() {
    let mut store = SyncStore::new();
    for (id, secs) in [(1, 10), (2, 20)] {
        store.insert_item(module(id, secs)).unwrap();
    }
    store
        .insert_item(ContentItem::new(5, ContentKind::DiagnosticAid, json!({}), at(15)))
        .unwrap();
    store.insert_step(DiagnosticStep {
        id: 50,
        aid_id: 5,
        step_order: 1,
        payload: json!({"text": "Check battery voltage"}),
    });

    let full = store.compute_delta(&device(), None, at(100));
    let from_epoch = store.compute_delta(&device(), Some(at(0)), at(100));

    assert_eq!(full, from_epoch);
    assert_eq!(full.item_count(), 3);
}

#[test]
fn check_without_since_always_reports_updates() {
    let empty = SyncStore::new();
    assert!(empty.check_for_updates(None).has_updates);
    assert!(!empty.check_for_updates(Some(at(0))).has_updates);
}

#[test]
fn check_agrees_with_delta() {
    let mut store = SyncStore::new();
    for (id, secs) in [(1, 10), (2, 20), (3, 30)] {
        store.insert_item(module(id, secs)).unwrap();
    }
    store.deactivate_item(ContentKind::Module, 3, at(40)).unwrap();

    let check = store.check_for_updates(Some(at(15)));
    let delta = store.compute_delta(&device(), Some(at(15)), at(50));

    assert_eq!(check.counts.total() as usize, delta.item_count());
    assert_eq!(delta.modules[0].id, 2);
}

// ============================================================================
// Download ledger
// ============================================================================

#[test]
fn download_then_admin_update_needs_update() {
    let mut store = SyncStore::new();
    store.insert_item(module(7, 10)).unwrap();
    store.update_item(ContentKind::Module, 7, json!({"rev": 2}), at(20)).unwrap();
    store.update_item(ContentKind::Module, 7, json!({"rev": 3}), at(30)).unwrap();

    store.record_download(&device(), 7, Some(3), at(40)).unwrap();
    let status = store.download_status(&device());
    assert_eq!(status[0].downloaded_version, 3);
    assert_eq!(status[0].current_version, 3);
    assert!(!status[0].needs_update);

    store.update_item(ContentKind::Module, 7, json!({"rev": 4}), at(50)).unwrap();
    let status = store.download_status(&device());
    assert_eq!(status[0].module_id, 7);
    assert_eq!(status[0].downloaded_version, 3);
    assert_eq!(status[0].current_version, 4);
    assert!(status[0].needs_update);
}

#[test]
fn older_download_overwrites_newer() {
    let mut store = SyncStore::new();
    store.insert_item(module(1, 10)).unwrap();
    store.update_item(ContentKind::Module, 1, json!({}), at(20)).unwrap();

    store.record_download(&device(), 1, Some(2), at(30)).unwrap();
    store.record_download(&device(), 1, Some(1), at(40)).unwrap();

    let status = store.download_status(&device());
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].downloaded_version, 1);
    assert_eq!(status[0].downloaded_at, at(40));
    assert!(status[0].needs_update);
}

#[test]
fn device_less_callers_share_the_unknown_slot() {
    let mut store = SyncStore::new();
    store.insert_item(module(1, 10)).unwrap();

    let a = Identity::new("mechanic-1", None);
    let b = Identity::new("mechanic-1", Some(""));
    store.record_download(&a, 1, Some(1), at(20)).unwrap();

    assert_eq!(store.download_status(&b).len(), 1);
    assert!(store.download_status(&device()).is_empty());
}

// ============================================================================
// Activity reconciliation
// ============================================================================

#[test]
fn empty_batch_is_a_validation_error() {
    let mut store = SyncStore::new();
    assert_eq!(
        store.ingest_batch(&device(), vec![], at(0)).unwrap_err(),
        Error::EmptyBatch
    );
}

#[test]
fn replayed_batch_with_event_ids_is_idempotent() {
    let mut store = SyncStore::new();
    let batch = vec![
        json!({"activityType": "view_error_code", "eventId": "a"}),
        json!({"activityType": "view_error_code", "eventId": "b"}),
    ];

    let first = store.ingest_batch(&device(), batch.clone(), at(0)).unwrap();
    let replay = store.ingest_batch(&device(), batch, at(5)).unwrap();

    assert_eq!(first.accepted, 2);
    assert_eq!(replay.accepted, 2);
    assert_eq!(store.activities().len(), 2);
}

proptest! {
    #[test]
    fn prop_delta_is_exactly_active_items_after_since(
        updates in proptest::collection::vec((0i64..1000, any::<bool>()), 0..40),
        since in proptest::option::of(0i64..1000),
    ) {
        let mut store = SyncStore::new();
        let mut expected = BTreeSet::new();
        for (i, (secs, active)) in updates.iter().enumerate() {
            let id = i as ItemId;
            let mut item = module(id, *secs);
            if !active {
                item.is_active = false;
            }
            if *active && since.map_or(true, |s| *secs > s) {
                expected.insert(id);
            }
            store.insert_item(item).unwrap();
        }

        let delta = store.compute_delta(&device(), since.map(at), at(2000));
        let got: BTreeSet<ItemId> = delta.modules.iter().map(|m| m.id).collect();

        prop_assert_eq!(got, expected);
        let counted = store.check_for_updates(since.map(at)).counts.modules as usize;
        prop_assert_eq!(counted, delta.modules.len());
    }

    #[test]
    fn prop_batch_accepts_all_but_malformed(
        shape in proptest::collection::vec(any::<bool>(), 1..50),
    ) {
        let mut store = SyncStore::new();
        let batch: Vec<serde_json::Value> = shape
            .iter()
            .map(|valid| {
                if *valid {
                    json!({"activityType": "open_module", "referenceId": 1})
                } else {
                    json!({"referenceId": 1})
                }
            })
            .collect();
        let malformed = shape.iter().filter(|v| !**v).count();

        let summary = store.ingest_batch(&device(), batch, at(0)).unwrap();

        prop_assert_eq!(summary.total, shape.len());
        prop_assert_eq!(summary.accepted, shape.len() - malformed);
        prop_assert_eq!(summary.failed, malformed);
        prop_assert_eq!(store.activities().len(), shape.len() - malformed);
    }
}
