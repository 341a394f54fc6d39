//! Sharding rules
//!
//! Declarative, per-table mapping from a record id to a shard key.
//! Rules are pure functions of the id's string form; changing a rule on a
//! table that already has data does not move existing records.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Shard key used by tables without a sharding rule
pub const DEFAULT_SHARD_KEY: &str = "data";

/// Maximum prefix length of the hex CRC32 digest
const MAX_HASH_CHARS: usize = 8;

/// How a table spreads its records across shard files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ShardRule {
    /// Every id maps to the same shard
    Constant { key: String },

    /// First `chars` hex characters of CRC32(id) (fan-out of 16^chars files)
    HashPrefix { chars: usize },

    /// First `chars` characters of the id itself
    IdPrefix { chars: usize },
}

impl ShardRule {
    /// Check the rule's parameters (called once at schema load)
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ShardRule::Constant { key } => {
                if key.is_empty() || sanitize_shard_key(key) != *key {
                    return Err(format!(
                        "constant shard key '{}' must be non-empty and contain only [0-9A-Za-z-]",
                        key
                    ));
                }
            }
            ShardRule::HashPrefix { chars } => {
                if *chars == 0 || *chars > MAX_HASH_CHARS {
                    return Err(format!(
                        "hashPrefix chars must be between 1 and {}, got {}",
                        MAX_HASH_CHARS, chars
                    ));
                }
            }
            ShardRule::IdPrefix { chars } => {
                if *chars == 0 {
                    return Err("idPrefix chars must be at least 1".to_string());
                }
            }
        }
        Ok(())
    }

    /// Apply the rule to an id's string form and return the raw shard key
    pub fn apply(&self, id: &str) -> String {
        match self {
            ShardRule::Constant { key } => key.clone(),
            ShardRule::HashPrefix { chars } => {
                let digest = format!("{:08x}", crc32fast::hash(id.as_bytes()));
                digest[..(*chars).min(MAX_HASH_CHARS)].to_string()
            }
            ShardRule::IdPrefix { chars } => id.chars().take(*chars).collect(),
        }
    }

    /// Resolve the file-safe shard key for an id
    ///
    /// Fails with `InvalidShardKey` if nothing usable remains after sanitizing.
    pub fn resolve(rule: Option<&ShardRule>, id: &str) -> Result<String> {
        let Some(rule) = rule else {
            return Ok(DEFAULT_SHARD_KEY.to_string());
        };

        let key = sanitize_shard_key(&rule.apply(id));
        if key.is_empty() {
            return Err(StoreError::InvalidShardKey(id.to_string()));
        }
        Ok(key)
    }
}

/// Strip everything but ASCII alphanumerics and '-' so a key is a safe file name
pub fn sanitize_shard_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}
