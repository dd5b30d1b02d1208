//! Integration tests for the action facade and the store task
//!
//! These exercise the public API end to end: concurrent callers, live
//! subscriptions and snapshots.

use async_store::{
    reduce, AsyncActionService, AsyncRecord, AsyncStatus, AsyncStore, RecordStream,
    ResolvedStatus, StoreConfig, StoreError, Transition,
};
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

async fn next(stream: &mut RecordStream) -> Option<AsyncRecord> {
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("record update within a second")
        .expect("record streams do not end while the store is alive")
}

#[tokio::test]
async fn test_full_lifecycle_through_facade() {
    let actions = AsyncActionService::spawn(StoreConfig::default().with_name("lifecycle"));

    actions
        .create("upload", "http", Some(json!({"file": "a.png"})))
        .unwrap();
    actions.start("upload").unwrap();
    actions
        .resolve_success("upload", Some(json!({"url": "/a.png"})))
        .unwrap();

    let record = actions.get("upload").await.unwrap().unwrap();
    assert_eq!(record.status, AsyncStatus::Resolved);
    assert_eq!(record.outcome(), Some(ResolvedStatus::Success));
    assert_eq!(record.payload, Some(json!({"file": "a.png"})));
    assert_eq!(record.result, Some(json!({"url": "/a.png"})));

    let started = record.started_ts.unwrap();
    let resolved = record.resolved_ts.unwrap();
    assert!(record.created_ts <= started);
    assert!(started <= resolved);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_order() {
    let actions = AsyncActionService::spawn(StoreConfig::default());

    let mut tasks = Vec::new();
    for i in 0..20 {
        let actions = actions.clone();
        tasks.push(tokio::spawn(async move {
            let id = format!("op{i}");
            actions.create(id.clone(), "job", None).unwrap();
            actions.start(id.clone()).unwrap();
            if i % 2 == 0 {
                actions.resolve_success(id, Some(json!(i))).unwrap();
            } else {
                actions.resolve_error(id, Some(json!("failed"))).unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    actions.flush().await.unwrap();

    let store = actions.snapshot().await.unwrap();
    assert_eq!(store.len(), 20);
    assert_eq!(store.with_status(AsyncStatus::Resolved).count(), 20);
    assert_eq!(
        store.get("op4").unwrap().outcome(),
        Some(ResolvedStatus::Success)
    );
    assert_eq!(
        store.get("op5").unwrap().outcome(),
        Some(ResolvedStatus::Error)
    );
}

#[tokio::test]
async fn test_first_resolution_wins_across_callers() {
    let actions = AsyncActionService::spawn(StoreConfig::default());
    actions.create("op", "job", None).unwrap();
    actions.start("op").unwrap();

    actions.resolve_cancel("op").unwrap();
    actions.resolve_success("op", Some(json!("late"))).unwrap();

    let record = actions.get("op").await.unwrap().unwrap();
    assert_eq!(record.outcome(), Some(ResolvedStatus::Cancel));
    assert_eq!(record.result, None);
}

#[tokio::test]
async fn test_subscription_before_creation() {
    let actions = AsyncActionService::spawn(StoreConfig::default());
    let mut updates = actions.select("later").await.unwrap();
    assert_eq!(next(&mut updates).await, None);

    actions.create("later", "job", None).unwrap();
    let record = next(&mut updates).await.unwrap();
    assert!(record.is_idle());

    actions.delete("later").unwrap();
    assert_eq!(next(&mut updates).await, None);
}

#[tokio::test]
async fn test_late_subscriber_sees_latest_value() {
    let actions = AsyncActionService::spawn(StoreConfig::default());
    actions.create("op", "job", None).unwrap();
    actions.start("op").unwrap();
    actions.resolve_error("op", Some(json!("boom"))).unwrap();

    let mut updates = actions.select("op").await.unwrap();
    let record = next(&mut updates).await.unwrap();
    assert_eq!(record.outcome(), Some(ResolvedStatus::Error));
    assert_eq!(record.result, Some(json!("boom")));
}

#[tokio::test]
async fn test_spawn_with_existing_store() {
    let mut store = AsyncStore::new();
    store.apply(Transition::create("seeded", "job", None, 10));
    store.apply(Transition::start("seeded", 20));

    let actions = AsyncActionService::spawn_with_store(store, StoreConfig::default());
    let record = actions.get("seeded").await.unwrap().unwrap();
    assert!(record.is_pending());
    assert_eq!(record.started_ts, Some(20));
}

#[tokio::test]
async fn test_snapshot_json_round_trip() {
    let actions = AsyncActionService::spawn(StoreConfig::default());
    actions.create("a", "fetch", Some(json!([1, 2]))).unwrap();
    actions.start("a").unwrap();
    actions.create("b", "fetch", None).unwrap();

    let store = actions.snapshot().await.unwrap();
    let value = store.to_json().unwrap();
    assert_eq!(value["states"]["a"]["status"], json!("pending"));
    assert_eq!(value["states"]["a"]["type"], json!("fetch"));
    assert!(value["states"]["b"].get("startedTs").is_none());

    assert_eq!(AsyncStore::from_json(value).unwrap(), store);
}

#[test]
fn test_reduce_replays_transition_log() {
    let log = vec![
        Transition::create("op", "job", None, 1),
        Transition::start("op", 2),
        Transition::cancel("op"),
        Transition::resolve_success("op", Some(json!(1)), 3),
        Transition::resolve_error("op", Some(json!(2)), 4),
    ];

    let store = log.into_iter().fold(AsyncStore::new(), reduce);
    let record = store.get("op").unwrap();
    assert_eq!(record.outcome(), Some(ResolvedStatus::Success));
    assert_eq!(record.resolved_ts, Some(3));
    assert_eq!(record.result, Some(json!(1)));
}

#[test]
fn test_closed_store_reports_error() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let actions = runtime.block_on(async { AsyncActionService::spawn(StoreConfig::default()) });
    drop(runtime);

    assert!(actions.is_closed());
    assert!(matches!(
        actions.create("op", "job", None),
        Err(StoreError::Closed)
    ));
}
