//! Cache Module
//!
//! In-memory write-back cache of shard files.
//!
//! ## Responsibilities
//! - Load each shard file at most once, however many callers ask for it
//! - Keep the sorted record array of every resident shard
//! - Track dirty shards and persist them on a periodic sweep
//! - Drop clean shards that have been idle for a while
//!
//! ## Shard Lifecycle
//! ```text
//!   first access ──► Loading ──read ok──────────────► Loaded ◄──┐
//!                       │                               │       │
//!                       ├─not found + create─► Loaded   │ set / │ sweep
//!                       │                               ▼ delete│ (save)
//!                       └─not found / error─► Failed   dirty ───┘
//!                                               │
//!                                      dropped, next access retries
//! ```
//!
//! Writes only touch memory; the sweep persists them later. A change is
//! visible to every reader immediately but is durable only after the next
//! successful save of its shard.

mod clock;
mod shard;
mod manager;

pub use clock::{Clock, ManualClock, SystemClock};
pub use shard::{LoadFailure, ShardCache, ShardId, ShardStatus};
pub use manager::{CacheManager, CacheStats, SweepReport, SweeperHandle};
