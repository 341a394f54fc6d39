//! Connection Handler
//!
//! Handles individual client connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::error::{Result, StoreError};
use crate::protocol::{read_request, write_response, Request, Response};
use crate::store::RecordStore;

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<OwnedReadHalf>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<OwnedWriteHalf>,

    /// Reference to the record store
    store: Arc<RecordStore>,

    /// Peer address for logging
    peer_addr: String,

    /// Close the connection after this long without a request
    read_timeout: Option<Duration>,

    /// Server shutdown signal; the connection closes between requests once set
    shutdown: Option<watch::Receiver<bool>>,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, store: Arc<RecordStore>) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            store,
            peer_addr,
            read_timeout: None,
            shutdown: None,
        })
    }

    /// Configure the idle read timeout (0 disables it)
    pub fn set_read_timeout(&mut self, read_ms: u64) {
        self.read_timeout = (read_ms > 0).then(|| Duration::from_millis(read_ms));
    }

    /// Stop reading new requests once the server shuts down
    pub fn set_shutdown(&mut self, shutdown: watch::Receiver<bool>) {
        self.shutdown = Some(shutdown);
    }

    /// Handle the connection until the client disconnects or the server stops
    ///
    /// Reads requests in a loop and sends responses. A request that is not
    /// valid JSON gets an error response and the connection stays open; a
    /// broken frame closes it.
    pub async fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let request = match self.next_request().await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(StoreError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Connection reset by client {}", self.peer_addr);
                    return Ok(());
                }
                Err(StoreError::Io(ref e)) if e.kind() == std::io::ErrorKind::TimedOut => {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e @ StoreError::Serialization(_)) => {
                    tracing::debug!("Malformed request from {}: {}", self.peer_addr, e);
                    self.send_response(Response::error(0, &e.to_string())).await?;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    // Send error response if possible
                    let _ = self.send_response(Response::error(0, &e.to_string())).await;
                    return Err(e);
                }
            };

            tracing::trace!(
                "Received {} (id {}) from {}",
                request.data.name(),
                request.id,
                self.peer_addr
            );

            let response = self.execute_request(request).await;

            if let Err(e) = self.send_response(response).await {
                if let StoreError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Read the next request, honoring the idle timeout
    ///
    /// Returns `Ok(None)` when the server shuts down while waiting.
    async fn next_request(&mut self) -> Result<Option<Request>> {
        let read_timeout = self.read_timeout;
        let reader = &mut self.reader;
        let read = async move {
            match read_timeout {
                Some(limit) => match tokio::time::timeout(limit, read_request(reader)).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "read timed out",
                    ))),
                },
                None => read_request(reader).await,
            }
        };

        match self.shutdown.as_mut() {
            Some(shutdown) => tokio::select! {
                result = read => result,
                _ = shutdown.wait_for(|stop| *stop) => {
                    tracing::debug!("Closing connection to {} for shutdown", self.peer_addr);
                    Ok(None)
                }
            },
            None => read.await,
        }
    }

    /// Execute a request and build its response
    async fn execute_request(&self, request: Request) -> Response {
        let command = request.data.name();
        match self.store.execute(request.data).await {
            Ok(data) => Response::ok(request.id, data),
            Err(e) => {
                tracing::debug!("{} failed for {}: {}", command, self.peer_addr, e);
                Response::error(request.id, &e.to_string())
            }
        }
    }

    /// Send a response to the client
    async fn send_response(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.writer, &response).await
    }
}

fn is_disconnect(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
    )
}
