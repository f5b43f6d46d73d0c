use std::time::Duration;

use chrono::Utc;

use super::*;
use crate::logic::events::{EventOptions, SecurityEvent, SecurityEventType};

fn event_aged(hours: i64) -> SecurityEvent {
    let mut e = SecurityEvent::new(
        SecurityEventType::AuthLoginFailure,
        crate::details!("attempts" => 1),
        EventOptions::new().user("u1"),
    );
    e.timestamp = Utc::now() - chrono::Duration::hours(hours);
    e
}

async fn exercise_event_store(store: &dyn EventStore) {
    let old = event_aged(48);
    let fresh = event_aged(1);
    store.append(&[old.clone(), fresh.clone()]).await.unwrap();
    // duplicate ids are ignored
    store.append(&[fresh.clone()]).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);

    let cutoff = Utc::now() - chrono::Duration::hours(24);
    let recent = store.load_since(cutoff).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, fresh.id);

    assert_eq!(store.purge_before(cutoff).await.unwrap(), 1);
    assert_eq!(store.purge_before(cutoff).await.unwrap(), 0);
    assert_eq!(store.count().await.unwrap(), 1);
}

async fn exercise_kv_store(store: &dyn KeyValueStore) {
    assert!(store.get("missing").await.unwrap().is_none());

    store.set("behavior:baseline:u1", b"one", Duration::ZERO).await.unwrap();
    store.set("behavior:baseline:u2", b"two", Duration::from_secs(3600)).await.unwrap();
    store.set("alert:a1", b"alert", Duration::ZERO).await.unwrap();

    assert_eq!(store.get("behavior:baseline:u1").await.unwrap(), Some(b"one".to_vec()));
    assert_eq!(
        store.keys_with_prefix("behavior:baseline:").await.unwrap(),
        vec!["behavior:baseline:u1".to_string(), "behavior:baseline:u2".to_string()]
    );

    assert!(store.delete("alert:a1").await.unwrap());
    assert!(!store.delete("alert:a1").await.unwrap());

    store.set("short", b"x", Duration::from_millis(20)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(store.get("short").await.unwrap().is_none());
    assert!(store.keys_with_prefix("short").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_memory_event_store() {
    exercise_event_store(&MemoryEventStore::default()).await;
}

#[tokio::test]
async fn test_memory_event_store_capacity() {
    let store = MemoryEventStore::new(3);
    let events: Vec<_> = (0..5).map(|i| event_aged(5 - i)).collect();
    store.append(&events).await.unwrap();
    assert_eq!(store.len(), 3);
    let kept = store.load_since(Utc::now() - chrono::Duration::days(1)).await.unwrap();
    assert_eq!(kept[0].id, events[2].id);
}

#[tokio::test]
async fn test_memory_kv_store() {
    exercise_kv_store(&MemoryKeyValueStore::new()).await;
}

#[tokio::test]
async fn test_memory_kv_purge_expired() {
    let store = MemoryKeyValueStore::new();
    store.set("a", b"1", Duration::from_millis(10)).await.unwrap();
    store.set("b", b"2", Duration::ZERO).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.purge_expired().await.unwrap(), 1);
    assert_eq!(store.purge_expired().await.unwrap(), 0);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_sqlite_event_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteEventStore::open(&dir.path().join("events.db")).unwrap();
    exercise_event_store(&store).await;
}

#[tokio::test]
async fn test_sqlite_kv_store() {
    let store = SqliteKeyValueStore::open_in_memory().unwrap();
    exercise_kv_store(&store).await;
}

#[tokio::test]
async fn test_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("secmon.db");

    {
        let kv = SqliteKeyValueStore::open(&path).unwrap();
        set_json(&kv, "incident:1", &vec![1, 2, 3], Duration::ZERO).await.unwrap();
        let events = SqliteEventStore::open(&path).unwrap();
        events.append(&[event_aged(0)]).await.unwrap();
    }

    let kv = SqliteKeyValueStore::open(&path).unwrap();
    let value: Option<Vec<i32>> = get_json(&kv, "incident:1").await.unwrap();
    assert_eq!(value, Some(vec![1, 2, 3]));
    let events = SqliteEventStore::open(&path).unwrap();
    assert_eq!(events.count().await.unwrap(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn test_sqlite_concurrent_writers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secmon.db");
    let events = std::sync::Arc::new(SqliteEventStore::open(&path).unwrap());
    let kv = std::sync::Arc::new(SqliteKeyValueStore::open(&path).unwrap());

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8 {
        let events = events.clone();
        let kv = kv.clone();
        tasks.spawn(async move {
            let batch: Vec<_> = (0..25).map(|_| event_aged(1)).collect();
            events.append(&batch).await.unwrap();
            kv.set(&format!("worker:{}", i), b"done", Duration::ZERO).await.unwrap();
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    assert_eq!(events.count().await.unwrap(), 200);
    assert_eq!(kv.keys_with_prefix("worker:").await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_get_json_rejects_garbage() {
    let kv = MemoryKeyValueStore::new();
    kv.set("bad", b"not json", Duration::ZERO).await.unwrap();
    let result: StoreResult<Option<Vec<i32>>> = get_json(&kv, "bad").await;
    assert!(matches!(result, Err(StoreError::Serialization(_))));
}
