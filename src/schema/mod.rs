//! Schema Module
//!
//! Static table definitions, parsed once at startup and immutable afterwards.
//!
//! ## Responsibilities
//! - Parse the JSON table configuration
//! - Validate records and ids against a table's field layout
//! - Map record ids to shard keys (declarative sharding rules)
//!
//! ## Configuration Format
//! ```text
//! {
//!   "tables": [
//!     {
//!       "name": "users",
//!       "fields": [{ "name": "user", "type": "string" }, ...],
//!       "indexOfId": 0,
//!       "shard": { "kind": "hashPrefix", "chars": 2 }      (optional)
//!     }
//!   ]
//! }
//! ```

mod value;
mod registry;
mod shard_rule;

pub use value::{FieldType, FieldValue, Record};
pub use registry::{FieldDef, Schema, SchemaConfig, TableConfig, TableDef};
pub use shard_rule::{sanitize_shard_key, ShardRule, DEFAULT_SHARD_KEY};
