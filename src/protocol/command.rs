//! Command definitions
//!
//! Represents commands from clients.

use serde::{Deserialize, Serialize};

use crate::filter::FilterExpr;
use crate::schema::{FieldValue, Record};

/// A parsed command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "params", rename_all = "camelCase")]
pub enum Command {
    /// Get a record by id
    Get { table: String, id: FieldValue },

    /// Check whether a record exists
    Has { table: String, id: FieldValue },

    /// Insert or overwrite records
    Set { table: String, records: Vec<Record> },

    /// Delete records by id
    Delete { table: String, ids: Vec<FieldValue> },

    /// Filter an unsharded table
    List {
        table: String,
        #[serde(default)]
        filter: FilterExpr,
    },

    /// List a table's shard keys
    Shards { table: String },

    /// Persist all dirty shards now
    Flush,

    /// Ping (health check)
    Ping,
}

impl Command {
    /// Command name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::Has { .. } => "has",
            Command::Set { .. } => "set",
            Command::Delete { .. } => "delete",
            Command::List { .. } => "list",
            Command::Shards { .. } => "shards",
            Command::Flush => "flush",
            Command::Ping => "ping",
        }
    }
}

/// A command with the client-chosen id echoed back in its response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub data: Command,
}

impl Request {
    pub fn new(id: u64, data: Command) -> Self {
        Self { id, data }
    }
}
