//! Tests for the shard cache
//!
//! These tests verify:
//! - Concurrent first accesses share one load
//! - The sweep coalesces writes and honours the minimum save gap
//! - Failed loads and failed saves are retried, not remembered
//! - Idle clean shards are evicted and dirty ones are kept
//! - A stopped sweeper no longer saves

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use cedarstore::cache::{ShardId, SweepReport};
use cedarstore::{Config, Record, RecordStore, StoreError};
use common::{setup_store_with_clock, setup_temp_store, test_config, test_schema};
use tempfile::TempDir;
use tokio::task::JoinSet;

// =============================================================================
// Helper Functions
// =============================================================================

fn item(id: i64, name: &str) -> Record {
    vec![id.into(), name.into(), false.into()]
}

fn items_shard() -> ShardId {
    ShardId::new("items", "data")
}

fn write_items_file(temp_dir: &TempDir, contents: &str) {
    let dir = temp_dir.path().join("items");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("data.json"), contents).unwrap();
}

fn config_with(temp_dir: &TempDir, min_save_gap: Duration, idle: Option<Duration>) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .min_save_gap(min_save_gap)
        .idle_eviction(idle)
        .build()
}

// =============================================================================
// Load Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_share_one_load() {
    let temp_dir = TempDir::new().unwrap();
    write_items_file(&temp_dir, r#"[[1,"a",false],[2,"b",true],[3,"c",false]]"#);
    let store = Arc::new(RecordStore::open(test_config(&temp_dir), test_schema()).unwrap());

    let mut tasks = JoinSet::new();
    for i in 0..16i64 {
        let store = Arc::clone(&store);
        tasks.spawn(async move { store.get("items", &((i % 3) + 1).into()).await });
    }

    while let Some(result) = tasks.join_next().await {
        assert!(result.unwrap().unwrap().is_some());
    }

    assert_eq!(store.cache().stats().loads(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sets_into_new_shard() {
    let (_temp, store) = setup_temp_store();
    let store = Arc::new(store);

    let mut tasks = JoinSet::new();
    for i in 0..32i64 {
        let store = Arc::clone(&store);
        tasks.spawn(async move { store.set("items", vec![item(i, "x")]).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    for i in 0..32i64 {
        assert!(store.has("items", &i.into()).await.unwrap());
    }
    assert_eq!(store.cache().stats().loads(), 1);
}

#[tokio::test]
async fn test_missing_shard_is_not_remembered() {
    let (temp, store) = setup_temp_store();

    assert_eq!(store.get("items", &1.into()).await.unwrap(), None);

    write_items_file(&temp, r#"[[1,"late",false]]"#);

    assert_eq!(
        store.get("items", &1.into()).await.unwrap(),
        Some(item(1, "late"))
    );
    assert_eq!(store.cache().stats().loads(), 2);
}

#[tokio::test]
async fn test_corrupt_shard_fails_then_recovers() {
    let (temp, store) = setup_temp_store();
    write_items_file(&temp, "this is not json");

    let result = store.get("items", &1.into()).await;
    assert!(matches!(result, Err(StoreError::CorruptShard { .. })));
    assert!(!store.cache().is_resident(&items_shard()));

    // A corrupt file is never silently replaced by an empty shard
    let result = store.set("items", vec![item(1, "a")]).await;
    assert!(matches!(result, Err(StoreError::CorruptShard { .. })));

    write_items_file(&temp, r#"[[1,"fixed",false]]"#);
    assert_eq!(
        store.get("items", &1.into()).await.unwrap(),
        Some(item(1, "fixed"))
    );
}

// =============================================================================
// Flush Policy Tests
// =============================================================================

#[tokio::test]
async fn test_sweep_coalesces_writes_within_save_gap() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with(&temp_dir, Duration::from_secs(1), None);
    let (store, clock) = setup_store_with_clock(config);

    // A shard that was never saved is due immediately
    store.set("items", vec![item(1, "a")]).await.unwrap();
    assert_eq!(store.sweep().await.saved, 1);

    store.set("items", vec![item(2, "b")]).await.unwrap();
    store.set("items", vec![item(3, "c")]).await.unwrap();
    assert_eq!(store.sweep().await.saved, 0);
    assert!(store.cache().is_dirty(&items_shard()));

    clock.advance(Duration::from_secs(2));
    assert_eq!(store.sweep().await.saved, 1);
    assert!(!store.cache().is_dirty(&items_shard()));

    assert_eq!(store.cache().stats().saves(), 2);

    let on_disk: Vec<Record> =
        serde_json::from_slice(&fs::read(temp_dir.path().join("items/data.json")).unwrap())
            .unwrap();
    assert_eq!(on_disk.len(), 3);
}

#[tokio::test]
async fn test_loaded_shard_waits_for_save_gap() {
    let temp_dir = TempDir::new().unwrap();
    write_items_file(&temp_dir, r#"[[1,"a",false]]"#);
    let config = config_with(&temp_dir, Duration::from_secs(1), None);
    let (store, clock) = setup_store_with_clock(config);

    store.set("items", vec![item(2, "b")]).await.unwrap();
    assert_eq!(store.sweep().await.saved, 0);

    clock.advance(Duration::from_secs(1));
    assert_eq!(store.sweep().await.saved, 1);
}

#[tokio::test]
async fn test_clean_shards_are_not_rewritten() {
    let temp_dir = TempDir::new().unwrap();
    write_items_file(&temp_dir, r#"[[1,"a",false]]"#);
    let config = config_with(&temp_dir, Duration::ZERO, None);
    let (store, _clock) = setup_store_with_clock(config);

    assert!(store.has("items", &1.into()).await.unwrap());

    assert_eq!(store.sweep().await, SweepReport::default());
    assert_eq!(store.flush().await.unwrap(), 0);
    assert_eq!(store.cache().stats().saves(), 0);
}

#[tokio::test]
async fn test_flush_ignores_save_gap() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with(&temp_dir, Duration::from_secs(3600), None);
    let (store, _clock) = setup_store_with_clock(config);

    store.set("items", vec![item(1, "a")]).await.unwrap();
    assert_eq!(store.flush().await.unwrap(), 1);

    store.set("items", vec![item(2, "b")]).await.unwrap();
    assert_eq!(store.sweep().await.saved, 0);
    assert_eq!(store.flush().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_save_is_retried() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with(&temp_dir, Duration::from_secs(1), None);
    let (store, _clock) = setup_store_with_clock(config);

    store.set("items", vec![item(1, "a")]).await.unwrap();

    // A plain file where the table directory should be
    let blocker = temp_dir.path().join("items");
    fs::write(&blocker, b"in the way").unwrap();

    let report = store.sweep().await;
    assert_eq!(report.saved, 0);
    assert_eq!(report.failed, 1);
    assert!(store.cache().is_dirty(&items_shard()));
    assert_eq!(store.cache().stats().save_failures(), 1);

    fs::remove_file(&blocker).unwrap();

    let report = store.sweep().await;
    assert_eq!(report.saved, 1);
    assert!(!store.cache().is_dirty(&items_shard()));
    assert!(blocker.join("data.json").exists());
}

#[tokio::test]
async fn test_flush_reports_save_error() {
    let (temp, store) = setup_temp_store();

    store.set("items", vec![item(1, "a")]).await.unwrap();
    fs::write(temp.path().join("items"), b"in the way").unwrap();

    assert!(matches!(store.flush().await, Err(StoreError::Io(_))));
    assert!(store.cache().is_dirty(&items_shard()));
}

// =============================================================================
// Eviction Tests
// =============================================================================

#[tokio::test]
async fn test_idle_clean_shard_is_evicted() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with(&temp_dir, Duration::from_secs(1), Some(Duration::from_secs(60)));
    let (store, clock) = setup_store_with_clock(config);

    store.set("items", vec![item(1, "a")]).await.unwrap();
    let report = store.sweep().await;
    assert_eq!(report.saved, 1);
    assert_eq!(report.evicted, 0);
    assert!(store.cache().is_resident(&items_shard()));

    clock.advance(Duration::from_secs(61));
    let report = store.sweep().await;
    assert_eq!(report.evicted, 1);
    assert!(!store.cache().is_resident(&items_shard()));
    assert_eq!(store.cache().stats().evictions(), 1);

    // Reloaded from disk on next access
    assert_eq!(
        store.get("items", &1.into()).await.unwrap(),
        Some(item(1, "a"))
    );
    assert_eq!(store.cache().stats().loads(), 2);
}

#[tokio::test]
async fn test_dirty_shard_is_not_evicted() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with(
        &temp_dir,
        Duration::from_secs(120),
        Some(Duration::from_secs(60)),
    );
    let (store, clock) = setup_store_with_clock(config);

    store.set("items", vec![item(1, "a")]).await.unwrap();
    assert_eq!(store.sweep().await.saved, 1);

    store.set("items", vec![item(2, "b")]).await.unwrap();
    clock.advance(Duration::from_secs(61));

    let report = store.sweep().await;
    assert_eq!(report.saved, 0);
    assert_eq!(report.evicted, 0);
    assert!(store.cache().is_resident(&items_shard()));
    assert!(store.cache().is_dirty(&items_shard()));
}

#[tokio::test]
async fn test_access_keeps_shard_resident() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with(&temp_dir, Duration::ZERO, Some(Duration::from_secs(60)));
    let (store, clock) = setup_store_with_clock(config);

    store.set("items", vec![item(1, "a")]).await.unwrap();
    store.sweep().await;

    clock.advance(Duration::from_secs(40));
    assert!(store.has("items", &1.into()).await.unwrap());
    clock.advance(Duration::from_secs(40));

    assert_eq!(store.sweep().await.evicted, 0);
    assert!(store.cache().is_resident(&items_shard()));
}

// =============================================================================
// Background Sweeper Tests
// =============================================================================

#[tokio::test]
async fn test_background_sweeper_persists_writes() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .sweep_interval(Duration::from_millis(20))
        .min_save_gap(Duration::ZERO)
        .build();
    let store = RecordStore::open(config, test_schema()).unwrap();
    let sweeper = store.spawn_sweeper();

    store.set("items", vec![item(1, "a")]).await.unwrap();

    let file = temp_dir.path().join("items").join("data.json");
    for _ in 0..100 {
        if file.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sweeper.stop();

    assert!(file.exists());
    assert!(!store.cache().is_dirty(&items_shard()));
}

#[tokio::test]
async fn test_stopped_sweeper_saves_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .sweep_interval(Duration::from_millis(20))
        .min_save_gap(Duration::ZERO)
        .build();
    let store = RecordStore::open(config, test_schema()).unwrap();

    let sweeper = store.spawn_sweeper();
    sweeper.stop();

    store.set("items", vec![item(1, "a")]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!temp_dir.path().join("items").join("data.json").exists());
    assert!(store.cache().is_dirty(&items_shard()));
    assert_eq!(store.cache().stats().saves(), 0);
}
