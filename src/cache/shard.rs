//! Shard cache
//!
//! In-memory state of one shard file.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::index;
use crate::schema::{FieldValue, Record};

/// Identifies a shard: one file of one table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardId {
    pub table: String,
    pub key: String,
}

impl ShardId {
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.key)
    }
}

/// Why a shard could not be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    /// No file for this shard yet
    NotFound,

    /// The read itself failed
    Io { kind: io::ErrorKind, message: String },

    /// The file is not a JSON array of records
    Corrupt(String),
}

/// Load state of a shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardStatus {
    Loading,
    Loaded,
    Failed(LoadFailure),
}

/// Records and persistence bookkeeping of one shard
///
/// Invariant: `records` is strictly ascending by the field at `id_index`.
#[derive(Debug)]
pub struct ShardCache {
    pub(crate) status: ShardStatus,
    pub(crate) records: Vec<Record>,
    pub(crate) id_index: usize,
    pub(crate) dirty: bool,
    /// Bumped on every mutation; lets a save tell whether it captured the latest state
    pub(crate) version: u64,
    pub(crate) last_save: Option<Instant>,
    pub(crate) last_access: Instant,
    /// Set when the manager dropped this shard; holders must re-resolve
    pub(crate) evicted: bool,
}

impl ShardCache {
    pub(crate) fn new(id_index: usize, now: Instant) -> Self {
        Self {
            status: ShardStatus::Loading,
            records: Vec::new(),
            id_index,
            dirty: false,
            version: 0,
            last_save: None,
            last_access: now,
            evicted: false,
        }
    }

    pub fn status(&self) -> &ShardStatus {
        &self.status
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_save(&self) -> Option<Instant> {
        self.last_save
    }

    pub fn last_access(&self) -> Instant {
        self.last_access
    }

    /// Find a record by id
    pub fn find(&self, id: &FieldValue) -> Option<&Record> {
        let location = index::locate(&self.records, self.id_index, id);
        if location.found {
            Some(&self.records[location.index])
        } else {
            None
        }
    }

    /// Insert a record, or overwrite the one with the same id
    ///
    /// The record must already be validated against the table schema.
    /// Returns true if an existing record was replaced.
    pub fn upsert(&mut self, record: Record) -> bool {
        let location = index::locate(&self.records, self.id_index, &record[self.id_index]);
        if location.found {
            self.records[location.index] = record;
        } else {
            self.records.insert(location.index, record);
        }
        self.mark_dirty();
        location.found
    }

    /// Remove the record with this id; returns false if there was none
    pub fn remove(&mut self, id: &FieldValue) -> bool {
        let location = index::locate(&self.records, self.id_index, id);
        if !location.found {
            return false;
        }
        self.records.remove(location.index);
        self.mark_dirty();
        true
    }

    /// Flag unsaved changes; the next eligible sweep persists them
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.version += 1;
    }
}

/// A resident shard as owned by the cache manager
pub(crate) struct ShardEntry {
    pub(crate) id: ShardId,
    pub(crate) path: PathBuf,
    /// Completes once the single load of this entry has finished
    pub(crate) load: OnceCell<()>,
    pub(crate) cache: Mutex<ShardCache>,
}

impl ShardEntry {
    pub(crate) fn new(id: ShardId, path: PathBuf, id_index: usize, now: Instant) -> Self {
        Self {
            id,
            path,
            load: OnceCell::new(),
            cache: Mutex::new(ShardCache::new(id_index, now)),
        }
    }
}
