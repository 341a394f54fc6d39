//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format (JSON lines)
//!
//! Every message is one JSON object terminated by `\n`.
//!
//! ### Request Format
//! ```text
//! {"id": 7, "data": {"command": "get", "params": {"table": "users", "id": "alice"}}}
//! ```
//!
//! ### Commands
//! - get:    {table, id}       → record or null
//! - has:    {table, id}       → bool
//! - set:    {table, records}  → null
//! - delete: {table, ids}      → null
//! - list:   {table, filter}   → records
//! - shards: {table}           → shard keys
//! - flush:  no params         → number of shards saved
//! - ping:   no params         → "pong"
//!
//! ### Response Format
//! ```text
//! {"id": 7, "success": true, "error": "", "data": [...]}
//! ```

mod command;
mod response;
mod codec;

pub use command::{Command, Request};
pub use response::Response;
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_request,
    read_response, write_request, write_response, MAX_FRAME_SIZE,
};
