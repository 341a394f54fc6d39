//! # Cedar Store
//!
//! A file-backed, shard-partitioned record store with:
//! - Typed tables defined by a static JSON schema
//! - Records spread over JSON shard files by a per-table sharding rule
//! - A write-back cache that loads each shard once and flushes dirty shards
//!   on a periodic sweep
//! - Binary-search lookups over each shard's sorted record array
//! - OR-of-AND filter queries over unsharded tables
//! - A JSON-lines TCP protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (JSON-lines requests)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Record Store                              │
//! │        (schema validation, shard resolution, filters)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Cache Manager                              │
//! │      (one load per shard, dirty tracking, flush sweep)       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Shard Cache │          │ Shard Files │
//!   │ (sorted Vec)│          │   (JSON)    │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod schema;
pub mod index;
pub mod cache;
pub mod filter;
pub mod store;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StoreError, Result};
pub use config::Config;
pub use filter::{Filter, FilterExpr, Predicate};
pub use schema::{FieldType, FieldValue, Record, Schema};
pub use store::RecordStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Cedar Store
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
