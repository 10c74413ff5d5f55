//! End-to-end lifecycle cycles across simulated process restarts.

use std::sync::Arc;

use rehydrate::cache::{
  CacheEntry, CacheLayer, CacheSource, DurableStore, FileStore, MemoryTier, SqliteStore,
  SyncErrorKind, SyncReport, Synchronizer,
};
use rehydrate::lifecycle::{AppState, LifecycleEvent, LifecycleObserver};
use serde_json::json;
use tempfile::TempDir;

/// One "process": a fresh memory tier wired to `store`.
fn boot(store: Arc<dyn DurableStore>) -> (Arc<MemoryTier>, LifecycleObserver) {
  let memory = Arc::new(MemoryTier::new());
  let sync = Arc::new(Synchronizer::new(memory.clone(), store));
  (memory, LifecycleObserver::new(sync))
}

fn file_store(dir: &TempDir) -> Arc<dyn DurableStore> {
  Arc::new(FileStore::open(dir.path(), "cache").unwrap())
}

#[tokio::test]
async fn test_cache_survives_restart_with_file_store() {
  let dir = TempDir::new().unwrap();

  // First run: nothing persisted yet
  let (memory, mut observer) = boot(file_store(&dir));
  let report = observer.handle(LifecycleEvent::Foreground).await;
  assert!(matches!(report, Some(SyncReport::NoSnapshot)));

  memory.set("/posts", CacheEntry::new(json!([{"id": 1}, {"id": 2}])));
  memory.set("/user", CacheEntry::new(json!({"name": "ada"})));

  let report = observer.handle(LifecycleEvent::Background).await;
  assert!(matches!(report, Some(SyncReport::Persisted { entries: 2, .. })));
  assert_eq!(observer.state(), AppState::Background);
  drop(observer);
  drop(memory);

  // Second run: cold memory, same directory
  let (memory, mut observer) = boot(file_store(&dir));
  assert!(memory.is_empty());

  let report = observer.handle(LifecycleEvent::Foreground).await;
  assert!(matches!(
    report,
    Some(SyncReport::Rehydrated {
      inserted: 2,
      kept: 0
    })
  ));
  assert_eq!(memory.get("/user").unwrap().data, json!({"name": "ada"}));

  // Rehydrated entries are served without touching the network
  let layer = CacheLayer::new(memory.clone());
  let result = layer
    .fetch("/posts", || async { Err(color_eyre::eyre::eyre!("offline")) })
    .await
    .unwrap();
  assert_eq!(result.source, CacheSource::CacheFresh);
  assert_eq!(result.data, json!([{"id": 1}, {"id": 2}]));
}

#[tokio::test]
async fn test_entries_written_before_rehydrate_win() {
  let dir = TempDir::new().unwrap();

  let (memory, mut observer) = boot(file_store(&dir));
  observer.on_foreground().await;
  memory.set("k", CacheEntry::new(json!("persisted")));
  observer.on_background().await;

  let (memory, mut observer) = boot(file_store(&dir));
  memory.set("k", CacheEntry::new(json!("fresh")));

  let report = observer.on_foreground().await;
  assert!(matches!(
    report,
    Some(SyncReport::Rehydrated {
      inserted: 0,
      kept: 1
    })
  ));
  assert_eq!(memory.get("k").unwrap().data, json!("fresh"));
}

#[tokio::test]
async fn test_corrupt_snapshot_is_reported_and_ignored() {
  let dir = TempDir::new().unwrap();
  let store = FileStore::open(dir.path(), "cache").unwrap();
  std::fs::write(store.path(), b"definitely not a snapshot").unwrap();

  let (memory, mut observer) = boot(Arc::new(store));
  let report = observer.on_foreground().await.unwrap();

  assert_eq!(report.error_kind(), Some(SyncErrorKind::Decode));
  assert!(memory.is_empty());
  assert_eq!(observer.state(), AppState::Active);

  // The next suspend overwrites the bad file
  memory.set("k", CacheEntry::new(json!(1)));
  let report = observer.on_background().await.unwrap();
  assert!(!report.is_failure());

  let (memory, mut observer) = boot(file_store(&dir));
  observer.on_foreground().await;
  assert_eq!(memory.get("k").unwrap().data, json!(1));
}

#[tokio::test]
async fn test_cache_survives_restart_with_sqlite_store() {
  let dir = TempDir::new().unwrap();
  let open = || -> Arc<dyn DurableStore> { Arc::new(SqliteStore::open(dir.path(), "cache").unwrap()) };

  let (memory, mut observer) = boot(open());
  observer.on_foreground().await;
  memory.set("a", CacheEntry::new(json!({"n": 1.5})));
  observer.on_background().await;
  drop(observer);

  let (memory, mut observer) = boot(open());
  observer.on_foreground().await;
  assert_eq!(memory.get("a").unwrap().data, json!({"n": 1.5}));
}

#[tokio::test]
async fn test_repeated_events_do_not_resync() {
  let dir = TempDir::new().unwrap();
  let (memory, mut observer) = boot(file_store(&dir));

  assert!(observer.handle(LifecycleEvent::Foreground).await.is_some());
  assert!(observer.handle(LifecycleEvent::Foreground).await.is_none());

  memory.set("k", CacheEntry::new(json!(true)));
  assert!(observer.handle(LifecycleEvent::Background).await.is_some());
  assert!(observer.handle(LifecycleEvent::Background).await.is_none());
}
