//! Error types for Cedar Store
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::FieldType;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for Cedar Store operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt shard file {path}: {reason}")]
    CorruptShard { path: PathBuf, reason: String },

    // -------------------------------------------------------------------------
    // Schema Errors
    // -------------------------------------------------------------------------
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    /// A record (or id) does not match the table's field layout.
    /// `record` is the position of the offending record within the batch.
    #[error("Schema mismatch in table '{table}', record {record}, field '{field}': {reason}")]
    SchemaMismatch {
        table: String,
        record: usize,
        field: String,
        reason: String,
    },

    #[error("Invalid shard key derived from id '{0}'")]
    InvalidShardKey(String),

    // -------------------------------------------------------------------------
    // Filter Errors
    // -------------------------------------------------------------------------
    #[error("Unknown field '{field}' in table '{table}'")]
    UnknownField { table: String, field: String },

    #[error("Filter on field '{field}' uses a {predicate} predicate but the field is a {actual}")]
    FilterTypeMismatch {
        field: String,
        predicate: &'static str,
        actual: FieldType,
    },

    #[error("Invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
