//! Record Store
//!
//! The table API every feature module reads and writes through.
//!
//! ## Responsibilities
//! - Validate records, ids and filters against the schema
//! - Resolve each id to its shard and run the lookup or mutation there
//! - Route decoded wire commands to the operations below
//! - Persist dirty shards on flush / close
//!
//! ## Consistency
//! - A `set` or `delete` is visible to every later `get` as soon as it
//!   returns, but reaches disk only on the next sweep that saves its shard
//! - Records in one `set` batch are committed one at a time: a schema
//!   mismatch at position `n` leaves records `0..n` applied
//! - Validation errors never leave a partial mutation of the offending record

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::cache::{CacheManager, Clock, ShardId, SweepReport, SweeperHandle, SystemClock};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::filter::{CompiledFilter, FilterExpr};
use crate::protocol::Command;
use crate::schema::{FieldValue, Record, Schema, TableDef, DEFAULT_SHARD_KEY};

/// File-backed, sharded record store
pub struct RecordStore {
    /// Store configuration
    config: Config,

    /// Immutable table definitions
    schema: Schema,

    /// Owner of every resident shard
    cache: Arc<CacheManager>,
}

impl RecordStore {
    /// Open a store over `config.data_dir`, creating the directory if needed
    pub fn open(config: Config, schema: Schema) -> Result<Self> {
        Self::open_with_clock(config, schema, Arc::new(SystemClock))
    }

    /// Open with a custom time source (used by tests to drive the flush policy)
    pub fn open_with_clock(config: Config, schema: Schema, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.sweep_interval.is_zero() {
            return Err(StoreError::Config(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        fs::create_dir_all(&config.data_dir)?;

        let cache = Arc::new(CacheManager::from_config(&config, clock));

        tracing::info!(
            data_dir = %config.data_dir.display(),
            tables = schema.len(),
            "Record store opened"
        );

        Ok(Self {
            config,
            schema,
            cache,
        })
    }

    /// Execute a command
    ///
    /// Routes commands to the matching operation and returns its result as JSON
    pub async fn execute(&self, command: Command) -> Result<Value> {
        match command {
            Command::Get { table, id } => Ok(json!(self.get(&table, &id).await?)),
            Command::Has { table, id } => Ok(json!(self.has(&table, &id).await?)),
            Command::Set { table, records } => {
                self.set(&table, records).await?;
                Ok(Value::Null)
            }
            Command::Delete { table, ids } => {
                self.delete(&table, &ids).await?;
                Ok(Value::Null)
            }
            Command::List { table, filter } => Ok(json!(self.list(&table, &filter).await?)),
            Command::Shards { table } => Ok(json!(self.shard_keys(&table).await?)),
            Command::Flush => Ok(json!(self.flush().await?)),
            Command::Ping => Ok(json!("pong")),
        }
    }

    /// Get a record by id
    ///
    /// Returns `Ok(None)` if the id (or its whole shard) does not exist.
    pub async fn get(&self, table: &str, id: &FieldValue) -> Result<Option<Record>> {
        let def = self.schema.table(table)?;
        def.validate_id(0, id)?;

        let shard = Self::shard_for(def, id)?;
        let found = self
            .cache
            .with_shard(&shard, def.index_of_id(), false, |cache| cache.find(id).cloned())
            .await?;

        Ok(found.flatten())
    }

    /// True if a record with this id exists
    pub async fn has(&self, table: &str, id: &FieldValue) -> Result<bool> {
        Ok(self.get(table, id).await?.is_some())
    }

    /// Insert or overwrite records
    ///
    /// Each record is validated and then committed on its own; the first
    /// invalid record stops the batch with `SchemaMismatch`.
    pub async fn set(&self, table: &str, records: Vec<Record>) -> Result<()> {
        let def = self.schema.table(table)?;

        for (position, record) in records.into_iter().enumerate() {
            def.validate_record(position, &record)?;

            let shard = Self::shard_for(def, &record[def.index_of_id()])?;
            self.cache
                .with_shard(&shard, def.index_of_id(), true, move |cache| {
                    cache.upsert(record);
                })
                .await?;
        }

        Ok(())
    }

    /// Delete records by id
    ///
    /// Ids that do not exist, in shards that may not exist, are skipped.
    pub async fn delete(&self, table: &str, ids: &[FieldValue]) -> Result<()> {
        let def = self.schema.table(table)?;
        for (position, id) in ids.iter().enumerate() {
            def.validate_id(position, id)?;
        }

        for id in ids {
            let shard = Self::shard_for(def, id)?;
            let removed = self
                .cache
                .with_shard(&shard, def.index_of_id(), false, |cache| cache.remove(id))
                .await?;

            if removed != Some(true) {
                tracing::trace!(table, %id, "Delete of missing id ignored");
            }
        }

        Ok(())
    }

    /// Records of an unsharded table matching `filter`
    ///
    /// Result order is the order in which records first matched, not id order.
    pub async fn list(&self, table: &str, filter: &FilterExpr) -> Result<Vec<Record>> {
        let def = self.schema.table(table)?;
        if def.is_sharded() {
            return Err(StoreError::UnsupportedOperation(format!(
                "cannot list sharded table '{}'",
                table
            )));
        }

        let compiled = CompiledFilter::compile(def, filter)?;
        if compiled.matches_nothing() {
            return Ok(Vec::new());
        }

        let shard = ShardId::new(table, DEFAULT_SHARD_KEY);
        let matches = self
            .cache
            .with_shard(&shard, def.index_of_id(), false, |cache| {
                compiled.evaluate(cache.records())
            })
            .await?;

        Ok(matches.unwrap_or_default())
    }

    /// Shard keys of a table, including shards not yet written to disk
    pub async fn shard_keys(&self, table: &str) -> Result<Vec<String>> {
        self.schema.table(table)?;
        self.cache.shard_keys(table).await
    }

    /// Run one flush sweep now (what the background sweeper does on each tick)
    pub async fn sweep(&self) -> SweepReport {
        self.cache.sweep().await
    }

    /// Persist every dirty shard immediately; returns the number saved
    pub async fn flush(&self) -> Result<usize> {
        self.cache.flush_all().await
    }

    /// Start the periodic flush sweep on the current tokio runtime
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        self.cache.spawn_sweeper(self.config.sweep_interval)
    }

    /// Close the store gracefully
    ///
    /// Flushes all pending changes
    pub async fn close(self) -> Result<()> {
        let saved = self.flush().await?;
        tracing::info!(saved, "Record store closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Get the cache manager
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn shard_for(def: &TableDef, id: &FieldValue) -> Result<ShardId> {
        Ok(ShardId::new(def.name(), def.shard_key(id)?))
    }
}
