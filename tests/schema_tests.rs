//! Tests for the schema registry
//!
//! These tests verify:
//! - Loading table definitions from JSON
//! - Rejection of malformed definitions
//! - Shard key resolution per table

use std::fs;

use cedarstore::schema::ShardRule;
use cedarstore::{FieldType, FieldValue, Schema, StoreError};
use tempfile::TempDir;

const SCHEMA_JSON: &str = r#"{
    "tables": [
        {
            "name": "lists",
            "fields": [
                { "name": "id", "type": "string" },
                { "name": "title", "type": "string" },
                { "name": "archived", "type": "boolean" }
            ],
            "indexOfId": 0
        },
        {
            "name": "points",
            "fields": [
                { "name": "score", "type": "number" },
                { "name": "user", "type": "string" }
            ],
            "indexOfId": 1,
            "shard": { "kind": "hashPrefix", "chars": 2 }
        }
    ]
}"#;

fn invalid_schema(json: &str) -> bool {
    matches!(Schema::from_json(json), Err(StoreError::InvalidSchema(_)))
}

// =============================================================================
// Loading Tests
// =============================================================================

#[test]
fn test_load_from_json() {
    let schema = Schema::from_json(SCHEMA_JSON).unwrap();

    assert_eq!(schema.len(), 2);

    let lists = schema.table("lists").unwrap();
    assert_eq!(lists.fields().len(), 3);
    assert_eq!(lists.id_field().field_type, FieldType::String);
    assert!(!lists.is_sharded());

    let points = schema.table("points").unwrap();
    assert_eq!(points.index_of_id(), 1);
    assert_eq!(points.id_field().name, "user");
    assert_eq!(points.field_index("score"), Some(0));
    assert_eq!(
        points.shard_rule(),
        Some(&ShardRule::HashPrefix { chars: 2 })
    );
}

#[test]
fn test_load_from_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("schema.json");
    fs::write(&path, SCHEMA_JSON).unwrap();

    let schema = Schema::from_path(&path).unwrap();

    assert!(schema.table("lists").is_ok());
}

#[test]
fn test_missing_schema_file() {
    let temp_dir = TempDir::new().unwrap();

    let result = Schema::from_path(&temp_dir.path().join("absent.json"));

    assert!(matches!(result, Err(StoreError::Io(_))));
}

#[test]
fn test_unknown_table() {
    let schema = Schema::from_json(SCHEMA_JSON).unwrap();

    assert!(matches!(
        schema.table("missing"),
        Err(StoreError::UnknownTable(ref name)) if name == "missing"
    ));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_rejects_empty_fields() {
    assert!(invalid_schema(
        r#"{"tables":[{"name":"t","fields":[],"indexOfId":0}]}"#
    ));
}

#[test]
fn test_rejects_id_index_out_of_range() {
    assert!(invalid_schema(
        r#"{"tables":[{"name":"t","fields":[{"name":"a","type":"number"}],"indexOfId":1}]}"#
    ));
}

#[test]
fn test_rejects_duplicate_field() {
    assert!(invalid_schema(
        r#"{"tables":[{"name":"t","fields":[
            {"name":"a","type":"number"},
            {"name":"a","type":"string"}
        ],"indexOfId":0}]}"#
    ));
}

#[test]
fn test_rejects_duplicate_table() {
    assert!(invalid_schema(
        r#"{"tables":[
            {"name":"t","fields":[{"name":"a","type":"number"}],"indexOfId":0},
            {"name":"t","fields":[{"name":"b","type":"number"}],"indexOfId":0}
        ]}"#
    ));
}

#[test]
fn test_rejects_unsafe_table_name() {
    assert!(invalid_schema(
        r#"{"tables":[{"name":"../etc","fields":[{"name":"a","type":"number"}],"indexOfId":0}]}"#
    ));
}

#[test]
fn test_rejects_unknown_field_type() {
    assert!(invalid_schema(
        r#"{"tables":[{"name":"t","fields":[{"name":"a","type":"date"}],"indexOfId":0}]}"#
    ));
}

#[test]
fn test_rejects_bad_shard_rule() {
    assert!(invalid_schema(
        r#"{"tables":[{"name":"t","fields":[{"name":"a","type":"string"}],"indexOfId":0,
            "shard":{"kind":"hashPrefix","chars":12}}]}"#
    ));
}

// =============================================================================
// Shard Key Tests
// =============================================================================

#[test]
fn test_unsharded_table_uses_single_shard() {
    let schema = Schema::from_json(SCHEMA_JSON).unwrap();
    let lists = schema.table("lists").unwrap();

    assert_eq!(lists.shard_key(&"a".into()).unwrap(), "data");
    assert_eq!(lists.shard_key(&"zzz".into()).unwrap(), "data");
}

#[test]
fn test_hash_prefix_shard_key() {
    let schema = Schema::from_json(SCHEMA_JSON).unwrap();
    let points = schema.table("points").unwrap();

    let key = points.shard_key(&FieldValue::from("alice")).unwrap();
    let expected = format!("{:08x}", crc32fast::hash(b"alice"));

    assert_eq!(key, expected[..2]);
    assert_eq!(points.shard_key(&"alice".into()).unwrap(), key);
}

#[test]
fn test_numeric_ids_shard_by_display_form() {
    let schema = Schema::from_json(
        r#"{"tables":[{"name":"t","fields":[{"name":"n","type":"number"}],"indexOfId":0,
            "shard":{"kind":"idPrefix","chars":2}}]}"#,
    )
    .unwrap();
    let table = schema.table("t").unwrap();

    assert_eq!(table.shard_key(&1234.into()).unwrap(), "12");
    assert_eq!(table.shard_key(&7.into()).unwrap(), "7");
}
