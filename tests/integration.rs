//! STOWAGE - Store Integration Tests
//! End-to-end tests of the store contract on the default engine:
//! put → get → delete → range scans → export/import → destroy → recovery.

use std::sync::{Arc, Mutex};

use serde_json::json;
use stowage::config::EngineConfig;
use stowage::engine::LsmEngine;
use stowage::store::{Store, StoreState};
use stowage::types::{ListItem, ListQuery, Record};
use stowage::{StoreError, StoreEvent};

mod common {
    use super::*;

    /// A store backed by an `LsmEngine` in `dir/name`.
    pub fn store(dir: &std::path::Path, name: &str) -> Store {
        let config = EngineConfig {
            data_dir: dir.join(name),
            sync_writes: false,
        };
        Store::new(name, Box::new(LsmEngine::new(config)))
    }

    /// `item000`..`item999` with their index as value.
    pub fn seed_items(store: &Store) {
        let records: Vec<Record> = (0..1000)
            .map(|i| Record::new(format!("item{:03}", i), json!(i)))
            .collect();
        store.import_all(&records).unwrap();
    }

    pub fn keys(items: &[ListItem]) -> Vec<String> {
        items.iter().map(|item| item.key().to_string()).collect()
    }
}

#[test]
fn test_missing_key_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");

    let lookup = store.get("never-written").unwrap();
    assert_eq!(lookup.key, "never-written");
    assert_eq!(lookup.value, None);
}

#[test]
fn test_put_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");

    let event = store.put("hello", json!({"message": "Hello world"})).unwrap();
    match event {
        StoreEvent::Write { key, timestamp } => {
            assert_eq!(key, "hello");
            assert!(timestamp > 0);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(
        store.get("hello").unwrap().value,
        Some(json!({"message": "Hello world"}))
    );

    store.put("hello", json!("overwritten")).unwrap();
    assert_eq!(store.get("hello").unwrap().value, Some(json!("overwritten")));
}

#[test]
fn test_delete_many_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");
    store.put("k1", json!(1)).unwrap();
    store.put("k2", json!(2)).unwrap();
    store.put("k3", json!(3)).unwrap();

    let event = store.del(&["k1", "k2"]).unwrap();
    assert!(matches!(event, StoreEvent::Delete { ref keys, .. } if keys == &["k1", "k2"]));

    assert_eq!(store.get("k1").unwrap().value, None);
    assert_eq!(store.get("k2").unwrap().value, None);
    assert_eq!(store.get("k3").unwrap().value, Some(json!(3)));
}

#[test]
fn test_delete_requires_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");
    let none: [&str; 0] = [];

    let err = store.del(&none).unwrap_err();
    assert!(matches!(err, StoreError::Validation { code: 400, .. }));
    assert!(matches!(store.del(&[""]), Err(StoreError::Validation { .. })));
}

#[test]
fn test_bounded_range_scan() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "items");
    common::seed_items(&store);

    let query = ListQuery::new().gt("item900").lt("item905").values(true);
    let items = store.list(&query).unwrap();
    assert_eq!(
        items,
        vec![
            ListItem::Record(Record::new("item901", json!(901))),
            ListItem::Record(Record::new("item902", json!(902))),
            ListItem::Record(Record::new("item903", json!(903))),
            ListItem::Record(Record::new("item904", json!(904))),
        ]
    );

    let limited = store.list(&query.limit(2)).unwrap();
    assert_eq!(common::keys(&limited), vec!["item901", "item902"]);
}

#[test]
fn test_scan_keys_only_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "items");
    common::seed_items(&store);

    let items = store
        .list(&ListQuery::new().gte("item998"))
        .unwrap();
    assert_eq!(
        items,
        vec![
            ListItem::Key("item998".into()),
            ListItem::Key("item999".into())
        ]
    );
}

#[test]
fn test_reverse_scan_with_limit() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "items");
    common::seed_items(&store);

    let query = ListQuery::new().lte("item010").reverse(true).limit(3);
    let items = store.list(&query).unwrap();
    assert_eq!(common::keys(&items), vec!["item010", "item009", "item008"]);

    assert!(store.list(&ListQuery::new().limit(0)).unwrap().is_empty());
    assert_eq!(store.list(&ListQuery::new()).unwrap().len(), 1000);
}

#[test]
fn test_inverted_range_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "items");
    common::seed_items(&store);

    let items = store
        .list(&ListQuery::new().gt("item500").lt("item100"))
        .unwrap();
    assert!(items.is_empty());
}

#[test]
fn test_export_destroy_import_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");
    store.put("b", json!({"n": 2})).unwrap();
    store.put("a", json!([1, 2, 3])).unwrap();
    store.put("c", json!(null)).unwrap();

    let exported = store.export_all().unwrap();
    assert_eq!(
        exported.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );

    assert!(matches!(store.destroy().unwrap(), StoreEvent::Destroy { .. }));
    assert_eq!(store.state(), StoreState::Destroyed);
    assert!(!dir.path().join("db").exists());

    let recreated = common::store(dir.path(), "db");
    assert!(recreated.export_all().unwrap().is_empty());
    let event = recreated.import_all(&exported).unwrap();
    assert!(matches!(event, StoreEvent::Import { ref keys, .. } if keys.len() == 3));
    assert_eq!(recreated.export_all().unwrap(), exported);
}

#[test]
fn test_import_requires_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");

    let err = store.import_all(&[]).unwrap_err();
    assert_eq!(err.code(), 400);
    assert_eq!(err.message(), "Database is empty.");
}

#[test]
fn test_destroyed_store_rejects_use() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");
    store.put("k", json!(1)).unwrap();
    store.destroy().unwrap();

    assert!(matches!(store.get("k"), Err(StoreError::Engine { code: 410, .. })));
    assert!(matches!(store.open(), Err(StoreError::Engine { .. })));
    assert!(store.destroy().is_err());
    // Closing a destroyed store is still harmless.
    store.close().unwrap();
}

#[test]
fn test_open_close_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");
    assert_eq!(store.state(), StoreState::Closed);

    store.close().unwrap();
    store.open().unwrap();
    store.open().unwrap();
    assert_eq!(store.state(), StoreState::Open);

    store.put("k", json!("v")).unwrap();
    store.close().unwrap();
    assert_eq!(store.state(), StoreState::Closed);

    // Implicit reopen on first use.
    assert_eq!(store.get("k").unwrap().value, Some(json!("v")));
    assert_eq!(store.state(), StoreState::Open);
}

#[test]
fn test_data_survives_reopen_by_new_handle() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = common::store(dir.path(), "db");
        store.put("persistent_key", json!("persistent_value")).unwrap();
        store.put("ephemeral", json!("data")).unwrap();
        store.del(&["ephemeral"]).unwrap();
        // Dropped without close: only the WAL remains.
    }
    let store = common::store(dir.path(), "db");
    assert_eq!(
        store.get("persistent_key").unwrap().value,
        Some(json!("persistent_value"))
    );
    assert_eq!(store.get("ephemeral").unwrap().value, None);
}

#[test]
fn test_single_subscriber_last_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");

    // No subscriber: events are dropped without error.
    store.put("early", json!(0)).unwrap();

    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    {
        let first = Arc::clone(&first);
        store.on_event(move |e| first.lock().unwrap().push(e.clone()));
    }
    store.put("a", json!(1)).unwrap();
    {
        let second = Arc::clone(&second);
        store.on_event(move |e| second.lock().unwrap().push(e.kind()));
    }
    store.del(&["a"]).unwrap();
    store.import_all(&[Record::new("b", json!(2))]).unwrap();
    store.destroy().unwrap();

    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(
        *second.lock().unwrap(),
        vec!["delete", "importDB", "deleteDB"]
    );
}

#[test]
fn test_unicode_keys_sort_bytewise() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");
    store.put("日本語", json!("japanese")).unwrap();
    store.put("café", json!("coffee")).unwrap();
    store.put("Zebra", json!("upper")).unwrap();
    store.put("apple", json!("lower")).unwrap();

    let keys = common::keys(&store.list(&ListQuery::new()).unwrap());
    assert_eq!(keys, vec!["Zebra", "apple", "café", "日本語"]);
    assert_eq!(store.get("café").unwrap().value, Some(json!("coffee")));
}

#[test]
fn test_metrics_track_operations() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store(dir.path(), "db");
    store.put("a", json!(1)).unwrap();
    store.get("a").unwrap();
    store.get("missing").unwrap();
    store.list(&ListQuery::new()).unwrap();
    store.del(&["a"]).unwrap();

    let m = store.metrics();
    use std::sync::atomic::Ordering;
    assert_eq!(m.puts.load(Ordering::Relaxed), 1);
    assert_eq!(m.gets.load(Ordering::Relaxed), 2);
    assert_eq!(m.scans.load(Ordering::Relaxed), 1);
    assert_eq!(m.deletes.load(Ordering::Relaxed), 1);
    assert_eq!(m.opens.load(Ordering::Relaxed), 1);
}
