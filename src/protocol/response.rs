//! Response definitions
//!
//! Represents responses to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers (0 if the request could not be parsed)
    pub id: u64,

    pub success: bool,

    /// Error message (empty on success)
    #[serde(default)]
    pub error: String,

    /// Result payload (null for commands without one)
    #[serde(default)]
    pub data: Value,
}

impl Response {
    /// Create a successful response
    pub fn ok(id: u64, data: Value) -> Self {
        Self {
            id,
            success: true,
            error: String::new(),
            data,
        }
    }

    /// Create an error response
    pub fn error(id: u64, message: &str) -> Self {
        Self {
            id,
            success: false,
            error: message.to_string(),
            data: Value::Null,
        }
    }
}
