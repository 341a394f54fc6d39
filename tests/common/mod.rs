//! Shared test fixtures

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cedarstore::cache::ManualClock;
use cedarstore::schema::{FieldDef, SchemaConfig, ShardRule};
use cedarstore::{Config, FieldType, RecordStore, Schema};
use tempfile::TempDir;

/// Tables used across the test suite
///
/// - `items`:    [id: number, name: string, done: boolean], unsharded
/// - `measures`: [key: string, num: number, flag: boolean], unsharded
/// - `users`:    [user: string, groups: string, admin: boolean], 1 hex char of fan-out
pub fn test_schema() -> Schema {
    let config = SchemaConfig::default()
        .table(
            "items",
            vec![
                FieldDef::new("id", FieldType::Number),
                FieldDef::new("name", FieldType::String),
                FieldDef::new("done", FieldType::Boolean),
            ],
            0,
            None,
        )
        .table(
            "measures",
            vec![
                FieldDef::new("key", FieldType::String),
                FieldDef::new("num", FieldType::Number),
                FieldDef::new("flag", FieldType::Boolean),
            ],
            0,
            None,
        )
        .table(
            "users",
            vec![
                FieldDef::new("user", FieldType::String),
                FieldDef::new("groups", FieldType::String),
                FieldDef::new("admin", FieldType::Boolean),
            ],
            0,
            Some(ShardRule::HashPrefix { chars: 1 }),
        );
    Schema::load(config).unwrap()
}

pub fn test_config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .min_save_gap(Duration::from_secs(1))
        .idle_eviction(None)
        .build()
}

pub fn setup_temp_store() -> (TempDir, RecordStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = RecordStore::open(test_config(&temp_dir), test_schema()).unwrap();
    (temp_dir, store)
}

pub fn setup_store_with_clock(config: Config) -> (RecordStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let store = RecordStore::open_with_clock(config, test_schema(), clock.clone()).unwrap();
    (store, clock)
}
