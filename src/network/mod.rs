//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - One accept loop on the tokio runtime
//! - One task per connection, capped by `max_connections`
//! - Commands routed through the RecordStore

mod server;
mod connection;

pub use server::Server;
pub use connection::Connection;
