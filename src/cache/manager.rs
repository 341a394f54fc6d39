//! Cache Manager
//!
//! Single owner of every resident shard and of its persistence state.
//!
//! ## Concurrency
//! - `shards`: map lock, held only to look up or swap entries
//! - each shard: its own `parking_lot::Mutex`, held for one synchronous
//!   locate-then-mutate step and never across an `.await`
//! - loads: one `OnceCell` per entry, so concurrent first accesses share a
//!   single file read
//! - sweeps: serialized by `flush_lock` so two sweeps never write one file
//!
//! Lock order is always `shards` → shard cache.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::index;
use crate::schema::Record;

use super::clock::Clock;
use super::shard::{LoadFailure, ShardCache, ShardEntry, ShardId, ShardStatus};

/// Counters for observing cache behaviour
#[derive(Debug, Default)]
pub struct CacheStats {
    loads: AtomicU64,
    saves: AtomicU64,
    save_failures: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Shard file reads started
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Successful shard file writes
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Failed shard file writes
    pub fn save_failures(&self) -> u64 {
        self.save_failures.load(Ordering::SeqCst)
    }

    /// Shards dropped from memory
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::SeqCst)
    }
}

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub saved: usize,
    pub failed: usize,
    pub evicted: usize,
}

/// Background sweeper task; stops when dropped
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Abort the sweeper task
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// How a due shard is persisted
enum SavePlan {
    /// Replace the file with these bytes
    Write(Vec<u8>),
    /// The shard is empty: remove its file
    Remove,
}

/// Outcome of applying a closure to a shard
enum Applied<R, F> {
    Done(R),
    Missing,
    Failed(StoreError),
    /// The entry was evicted underneath us; hand the closure back
    Retry(F),
}

/// Owns the map of loaded shards
pub struct CacheManager {
    /// Root directory; shard files live at `{data_dir}/{table}/{key}.json`
    data_dir: PathBuf,

    shards: Mutex<HashMap<ShardId, Arc<ShardEntry>>>,

    /// Serializes sweeps and forced flushes
    flush_lock: tokio::sync::Mutex<()>,

    clock: Arc<dyn Clock>,

    min_save_gap: Duration,

    idle_eviction: Option<Duration>,

    stats: CacheStats,
}

impl CacheManager {
    const SHARD_EXTENSION: &'static str = "json";

    /// Create a manager for shards under `data_dir`
    pub fn new(
        data_dir: impl Into<PathBuf>,
        min_save_gap: Duration,
        idle_eviction: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            shards: Mutex::new(HashMap::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            clock,
            min_save_gap,
            idle_eviction,
            stats: CacheStats::default(),
        }
    }

    /// Create a manager from the store configuration
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.data_dir.clone(),
            config.min_save_gap,
            config.idle_eviction,
            clock,
        )
    }

    /// Run `f` against a shard, loading it first if needed
    ///
    /// Returns `Ok(None)` when the shard has no file and `create` is false.
    /// With `create` set, a missing shard starts out empty. Other load
    /// failures are returned to every waiter and are not remembered: the next
    /// call reads the file again.
    pub async fn with_shard<R, F>(
        &self,
        id: &ShardId,
        id_index: usize,
        create: bool,
        f: F,
    ) -> Result<Option<R>>
    where
        F: FnOnce(&mut ShardCache) -> R,
    {
        let mut f = f;
        loop {
            let entry = self.acquire(id, id_index).await;
            match self.try_apply(&entry, create, f) {
                Applied::Done(result) => return Ok(Some(result)),
                Applied::Missing => {
                    self.forget(&entry);
                    return Ok(None);
                }
                Applied::Failed(err) => {
                    self.forget(&entry);
                    return Err(err);
                }
                Applied::Retry(back) => f = back,
            }
        }
    }

    /// Persist every dirty shard that is due, then evict idle ones
    ///
    /// A failed save leaves its shard dirty; it is retried on the next sweep.
    pub async fn sweep(&self) -> SweepReport {
        let _guard = self.flush_lock.lock().await;

        let mut report = SweepReport::default();
        for entry in self.snapshot() {
            match self.flush_entry(&entry, false).await {
                Ok(true) => report.saved += 1,
                Ok(false) => {}
                Err(_) => report.failed += 1,
            }
        }
        report.evicted = self.evict_idle();

        if report.saved > 0 || report.failed > 0 || report.evicted > 0 {
            tracing::debug!(
                saved = report.saved,
                failed = report.failed,
                evicted = report.evicted,
                "Cache sweep finished"
            );
        }
        report
    }

    /// Persist every dirty shard now, ignoring the minimum save gap
    ///
    /// Returns the number of shards written, or the first error after
    /// attempting all of them.
    pub async fn flush_all(&self) -> Result<usize> {
        let _guard = self.flush_lock.lock().await;

        let mut saved = 0;
        let mut first_error = None;
        for entry in self.snapshot() {
            match self.flush_entry(&entry, true).await {
                Ok(true) => saved += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    /// Start the periodic sweep on the current tokio runtime
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let report = manager.sweep().await;
                if report.failed > 0 {
                    tracing::warn!(
                        failed = report.failed,
                        "Some shards could not be saved; retrying next sweep"
                    );
                }
            }
        });

        SweeperHandle { task }
    }

    /// File that backs a shard
    pub fn shard_path(&self, id: &ShardId) -> PathBuf {
        self.data_dir
            .join(&id.table)
            .join(format!("{}.{}", id.key, Self::SHARD_EXTENSION))
    }

    /// Directory holding a table's shard files
    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.data_dir.join(table)
    }

    /// Keys of a table's shards: files on disk plus resident, unsaved shards
    pub async fn shard_keys(&self, table: &str) -> Result<Vec<String>> {
        let mut keys = self.resident_keys(table);

        match tokio::fs::read_dir(self.table_dir(table)).await {
            Ok(mut dir) => {
                while let Some(entry) = dir.next_entry().await? {
                    if let Some(key) = Self::parse_shard_key(&entry.path()) {
                        keys.push(key);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Keys of a table's loaded shards
    pub fn resident_keys(&self, table: &str) -> Vec<String> {
        self.shards
            .lock()
            .iter()
            .filter(|(id, entry)| {
                id.table == table && entry.cache.lock().status == ShardStatus::Loaded
            })
            .map(|(id, _)| id.key.clone())
            .collect()
    }

    /// Number of shards currently held in memory
    pub fn resident_count(&self) -> usize {
        self.shards.lock().len()
    }

    /// True if the shard is held in memory
    pub fn is_resident(&self, id: &ShardId) -> bool {
        self.shards.lock().contains_key(id)
    }

    /// True if the shard is resident with unsaved changes
    pub fn is_dirty(&self, id: &ShardId) -> bool {
        self.shards
            .lock()
            .get(id)
            .map_or(false, |entry| entry.cache.lock().dirty)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Get or create the entry for a shard and wait for its load
    async fn acquire(&self, id: &ShardId, id_index: usize) -> Arc<ShardEntry> {
        let entry = {
            let mut shards = self.shards.lock();
            let stale = shards
                .get(id)
                .map_or(true, |entry| entry.cache.lock().evicted);
            if stale {
                let entry = ShardEntry::new(
                    id.clone(),
                    self.shard_path(id),
                    id_index,
                    self.clock.now(),
                );
                shards.insert(id.clone(), Arc::new(entry));
            }
            Arc::clone(&shards[id])
        };

        entry.load.get_or_init(|| self.load(&entry)).await;
        entry
    }

    /// Read the shard file into the entry (runs once per entry)
    async fn load(&self, entry: &ShardEntry) {
        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(shard = %entry.id, "Loading shard");

        let result = match tokio::fs::read(&entry.path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<Record>>(&bytes)
                .map_err(|e| LoadFailure::Corrupt(e.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(LoadFailure::NotFound),
            Err(e) => Err(LoadFailure::Io {
                kind: e.kind(),
                message: e.to_string(),
            }),
        };

        let now = self.clock.now();
        let mut cache = entry.cache.lock();
        match result {
            Ok(records) => {
                if !index::is_sorted(&records, cache.id_index) {
                    tracing::warn!(shard = %entry.id, "Shard file is not sorted by id");
                }
                tracing::debug!(shard = %entry.id, records = records.len(), "Shard loaded");
                cache.records = records;
                cache.status = ShardStatus::Loaded;
                cache.last_save = Some(now);
            }
            Err(failure) => {
                if failure != LoadFailure::NotFound {
                    tracing::warn!(shard = %entry.id, ?failure, "Failed to load shard");
                }
                cache.status = ShardStatus::Failed(failure);
            }
        }
    }

    /// The synchronous half of `with_shard`: one lock, no suspension
    fn try_apply<R, F>(&self, entry: &ShardEntry, create: bool, f: F) -> Applied<R, F>
    where
        F: FnOnce(&mut ShardCache) -> R,
    {
        let mut cache = entry.cache.lock();

        match cache.status.clone() {
            ShardStatus::Loaded | ShardStatus::Loading if cache.evicted => {
                return Applied::Retry(f);
            }
            ShardStatus::Loaded => {}
            ShardStatus::Failed(LoadFailure::NotFound) if create => {
                if cache.evicted {
                    return Applied::Retry(f);
                }
                tracing::debug!(shard = %entry.id, "Creating new shard");
                cache.records = Vec::new();
                cache.status = ShardStatus::Loaded;
            }
            ShardStatus::Failed(failure) => {
                // Do not cache the failure; the next access reloads
                cache.evicted = true;
                return match failure {
                    LoadFailure::NotFound => Applied::Missing,
                    LoadFailure::Io { kind, message } => {
                        Applied::Failed(StoreError::Io(io::Error::new(kind, message)))
                    }
                    LoadFailure::Corrupt(reason) => Applied::Failed(StoreError::CorruptShard {
                        path: entry.path.clone(),
                        reason,
                    }),
                };
            }
            ShardStatus::Loading => return Applied::Retry(f),
        }

        cache.last_access = self.clock.now();
        Applied::Done(f(&mut cache))
    }

    /// Drop an entry from the map if it is still the current one
    fn forget(&self, entry: &Arc<ShardEntry>) {
        let mut shards = self.shards.lock();
        if shards
            .get(&entry.id)
            .map_or(false, |current| Arc::ptr_eq(current, entry))
        {
            shards.remove(&entry.id);
        }
    }

    fn snapshot(&self) -> Vec<Arc<ShardEntry>> {
        self.shards.lock().values().cloned().collect()
    }

    /// Save one shard if it is dirty (and due, unless forced)
    ///
    /// A shard left without records has its file removed and is dropped from
    /// memory. Returns whether the file was written or removed.
    async fn flush_entry(&self, entry: &Arc<ShardEntry>, force: bool) -> Result<bool> {
        let Some((version, plan)) = self.plan_save(entry, force)? else {
            return Ok(false);
        };

        let result = match &plan {
            SavePlan::Write(bytes) => Self::write_shard(&entry.path, bytes).await,
            SavePlan::Remove => Self::remove_shard(&entry.path).await,
        };

        match result {
            Ok(()) => {
                let now = self.clock.now();
                let mut shards = self.shards.lock();
                let mut cache = entry.cache.lock();
                cache.last_save = Some(now);
                // A mutation during the write keeps the shard dirty
                if cache.version == version {
                    cache.dirty = false;
                    if matches!(plan, SavePlan::Remove) {
                        cache.evicted = true;
                        if shards
                            .get(&entry.id)
                            .map_or(false, |current| Arc::ptr_eq(current, entry))
                        {
                            shards.remove(&entry.id);
                        }
                    }
                }
                self.stats.saves.fetch_add(1, Ordering::SeqCst);
                match plan {
                    SavePlan::Write(bytes) => {
                        tracing::debug!(shard = %entry.id, bytes = bytes.len(), "Shard saved")
                    }
                    SavePlan::Remove => tracing::debug!(shard = %entry.id, "Empty shard removed"),
                }
                Ok(true)
            }
            Err(e) => {
                self.stats.save_failures.fetch_add(1, Ordering::SeqCst);
                tracing::error!(
                    shard = %entry.id,
                    path = %entry.path.display(),
                    error = %e,
                    "Could not save shard"
                );
                Err(e.into())
            }
        }
    }

    /// Snapshot a shard's records for saving, if it should be saved now
    fn plan_save(&self, entry: &ShardEntry, force: bool) -> Result<Option<(u64, SavePlan)>> {
        let now = self.clock.now();
        let cache = entry.cache.lock();

        if cache.status != ShardStatus::Loaded || !cache.dirty {
            return Ok(None);
        }

        if !force {
            if let Some(last_save) = cache.last_save {
                if now.saturating_duration_since(last_save) < self.min_save_gap {
                    return Ok(None);
                }
            }
        }

        let plan = if cache.records.is_empty() {
            SavePlan::Remove
        } else {
            SavePlan::Write(serde_json::to_vec(&cache.records)?)
        };
        Ok(Some((cache.version, plan)))
    }

    /// Replace a shard file (write to a sibling temp file, then rename)
    async fn write_shard(path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await
    }

    /// Delete a shard file, then its table directory if that is now empty
    async fn remove_shard(path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        }

        if let Some(table_dir) = path.parent() {
            // Only succeeds once the last shard file is gone
            if tokio::fs::remove_dir(table_dir).await.is_ok() {
                tracing::debug!(dir = %table_dir.display(), "Removed empty table directory");
            }
        }
        Ok(())
    }

    /// Drop failed entries and clean shards idle past the eviction window
    fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let mut shards = self.shards.lock();
        let before = shards.len();

        shards.retain(|id, entry| {
            let mut cache = entry.cache.lock();
            let evict = match &cache.status {
                ShardStatus::Failed(_) => true,
                ShardStatus::Loading => false,
                ShardStatus::Loaded => {
                    !cache.dirty && self.is_idle(now, cache.last_access)
                }
            };
            if evict {
                cache.evicted = true;
                tracing::debug!(shard = %id, "Evicting shard");
            }
            !evict
        });

        let evicted = before - shards.len();
        self.stats.evictions.fetch_add(evicted as u64, Ordering::SeqCst);
        evicted
    }

    fn is_idle(&self, now: Instant, last_access: Instant) -> bool {
        self.idle_eviction
            .map_or(false, |window| now.saturating_duration_since(last_access) > window)
    }

    /// "sales/3f.json" → Some("3f")
    fn parse_shard_key(path: &Path) -> Option<String> {
        if path.extension()? != Self::SHARD_EXTENSION {
            return None;
        }
        Some(path.file_stem()?.to_string_lossy().into_owned())
    }
}
