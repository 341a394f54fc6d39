//! TCP Server
//!
//! Accepts connections and spawns a task per client.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::store::RecordStore;

use super::Connection;

/// TCP server for Cedar Store
pub struct Server {
    config: Config,
    store: Arc<RecordStore>,
    /// Limits concurrently served connections
    connections: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

impl Server {
    /// Create a new server with the given config and store
    pub fn new(config: Config, store: Arc<RecordStore>) -> Self {
        let connections = Arc::new(Semaphore::new(config.max_connections.max(1)));
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            store,
            connections,
            shutdown,
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|e| {
                StoreError::Network(format!("bind {}: {}", self.config.listen_addr, e))
            })?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    ///
    /// Returns once every connection has finished, so nothing can write to
    /// the store after this resolves.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        tracing::info!(?addr, "Listening for connections");

        let mut shutdown = self.shutdown.subscribe();
        let mut connections = JoinSet::new();
        loop {
            if *shutdown.borrow() {
                break;
            }

            // Reap finished connection tasks
            while connections.try_join_next().is_some() {}

            let permit = tokio::select! {
                permit = Arc::clone(&self.connections).acquire_owned() => permit
                    .map_err(|e| StoreError::Network(e.to_string()))?,
                _ = shutdown.changed() => break,
            };

            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        continue;
                    }
                },
                _ = shutdown.changed() => break,
            };

            tracing::debug!(%peer, "Accepted connection");

            let store = Arc::clone(&self.store);
            let read_timeout_ms = self.config.read_timeout_ms;
            let connection_shutdown = self.shutdown.subscribe();
            connections.spawn(async move {
                let _permit = permit;
                match Connection::new(stream, store) {
                    Ok(mut connection) => {
                        connection.set_read_timeout(read_timeout_ms);
                        connection.set_shutdown(connection_shutdown);
                        if let Err(e) = connection.handle().await {
                            tracing::warn!(%peer, "Connection closed with error: {}", e);
                        }
                    }
                    Err(e) => tracing::warn!(%peer, "Could not set up connection: {}", e),
                }
            });
        }

        tracing::info!(
            open = connections.len(),
            "Server stopped accepting connections; waiting for open connections"
        );
        while connections.join_next().await.is_some() {}

        tracing::info!("All connections closed");
        Ok(())
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
