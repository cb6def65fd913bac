//! Outbound client connections and the pluggable connection factory
//!
//! The server opens a client connection to verify the backend is reachable
//! before it starts listening, and hands the same factory out through
//! `Server::open_client_connection`. Until a factory is configured the
//! default one yields a [`NullConnection`] failure.

use rfcserver_types::{RfcErrorInfo, RfcRc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Attributes describing an open client connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionAttributes {
    pub system_id: String,
    pub client: String,
    pub user: String,
    pub language: String,
    pub partner_host: String,
}

/// Capability set of an outbound connection to the backend
pub trait ClientConnection: Send {
    /// Round trip to the partner without calling a function
    fn ping(&mut self) -> Result<(), RfcErrorInfo>;

    /// Commit the partner's logical unit of work
    fn commit(&mut self) -> Result<(), RfcErrorInfo>;

    /// Commit and wait for the update task to finish
    fn commit_and_wait(&mut self) -> Result<(), RfcErrorInfo>;

    fn rollback(&mut self) -> Result<(), RfcErrorInfo>;

    /// Cancel the call currently running on this connection
    fn cancel(&mut self) -> Result<(), RfcErrorInfo>;

    fn attributes(&self) -> Result<ConnectionAttributes, RfcErrorInfo>;

    /// Close the connection, releasing it on the partner side
    fn close(self: Box<Self>) -> Result<(), RfcErrorInfo>;
}

/// Produces outbound connections on demand
pub type ConnectionFactory =
    Arc<dyn Fn() -> Result<Box<dyn ClientConnection>, RfcErrorInfo> + Send + Sync>;

/// The fixed failure reported when no client connection is available
pub fn no_client_connection() -> RfcErrorInfo {
    RfcErrorInfo::new(RfcRc::Closed, "no client connection")
}

/// Factory used until one is configured; it never produces a connection
pub fn default_factory() -> ConnectionFactory {
    Arc::new(|| -> Result<Box<dyn ClientConnection>, RfcErrorInfo> { Err(no_client_connection()) })
}

/// Connection placeholder whose every operation fails with `RFC_CLOSED`
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConnection;

impl ClientConnection for NullConnection {
    fn ping(&mut self) -> Result<(), RfcErrorInfo> {
        Err(no_client_connection())
    }

    fn commit(&mut self) -> Result<(), RfcErrorInfo> {
        Err(no_client_connection())
    }

    fn commit_and_wait(&mut self) -> Result<(), RfcErrorInfo> {
        Err(no_client_connection())
    }

    fn rollback(&mut self) -> Result<(), RfcErrorInfo> {
        Err(no_client_connection())
    }

    fn cancel(&mut self) -> Result<(), RfcErrorInfo> {
        Err(no_client_connection())
    }

    fn attributes(&self) -> Result<ConnectionAttributes, RfcErrorInfo> {
        Err(no_client_connection())
    }

    fn close(self: Box<Self>) -> Result<(), RfcErrorInfo> {
        Err(no_client_connection())
    }
}
