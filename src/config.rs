//! Configuration for Cedar Store
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a Cedar Store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all shard files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {table}/
    ///           └── {shard_key}.json
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// How often the flush sweep runs
    pub sweep_interval: Duration,

    /// Minimum time between two saves of the same shard
    pub min_save_gap: Duration,

    /// Drop clean shards not accessed for this long (None disables eviction)
    pub idle_eviction: Option<Duration>,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Idle connection read timeout (milliseconds, 0 = no timeout)
    pub read_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./cedar_data"),
            sweep_interval: Duration::from_secs(5),
            min_save_gap: Duration::from_secs(1),
            idle_eviction: Some(Duration::from_secs(60)),
            listen_addr: "127.0.0.1:8081".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all shard files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the flush sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Set the minimum gap between saves of one shard
    pub fn min_save_gap(mut self, gap: Duration) -> Self {
        self.config.min_save_gap = gap;
        self
    }

    /// Set the idle eviction window (None disables eviction)
    pub fn idle_eviction(mut self, window: Option<Duration>) -> Self {
        self.config.idle_eviction = window;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
