//! Cedar Store Server Binary
//!
//! Serves a data directory over the JSON-lines TCP protocol.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cedarstore::network::Server;
use cedarstore::{Config, RecordStore, Schema};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// Cedar Store Server
#[derive(Parser, Debug)]
#[command(name = "cedar-server")]
#[command(about = "File-backed sharded record store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./cedar_data")]
    data_dir: PathBuf,

    /// Table schema (JSON)
    #[arg(short, long, default_value = "./schema.json")]
    schema: PathBuf,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8081")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Flush sweep interval in milliseconds
    #[arg(long, default_value = "5000")]
    sweep_ms: u64,

    /// Minimum gap between saves of one shard in milliseconds
    #[arg(long, default_value = "1000")]
    min_save_gap_ms: u64,

    /// Evict clean shards idle for this many seconds (0 disables eviction)
    #[arg(long, default_value = "60")]
    idle_secs: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cedarstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Cedar Store Server v{}", cedarstore::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());
    tracing::info!("Schema: {}", args.schema.display());
    tracing::info!("Listen address: {}", args.listen);

    let schema = match Schema::from_path(&args.schema) {
        Ok(schema) => schema,
        Err(e) => {
            tracing::error!("Failed to load schema: {}", e);
            std::process::exit(1);
        }
    };

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .sweep_interval(Duration::from_millis(args.sweep_ms))
        .min_save_gap(Duration::from_millis(args.min_save_gap_ms))
        .idle_eviction((args.idle_secs > 0).then(|| Duration::from_secs(args.idle_secs)))
        .build();

    // Open store
    let store = match RecordStore::open(config.clone(), schema) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let sweeper = store.spawn_sweeper();
    tracing::info!("Store initialized successfully");

    let server = Arc::new(Server::new(config, Arc::clone(&store)));

    // Stop accepting on Ctrl+C
    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
            signal_server.shutdown();
        }
    });

    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    // Every connection has closed by now; persist what they wrote
    sweeper.stop();
    match store.flush().await {
        Ok(saved) => tracing::info!("Flushed {} shards", saved),
        Err(e) => {
            tracing::error!("Final flush failed: {}", e);
            std::process::exit(1);
        }
    }

    tracing::info!("Server stopped");
}
