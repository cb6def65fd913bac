//! rfcserver-core - lifecycle management for ABAP-style RFC servers
//!
//! A [`Server`] owns one native server object of a backend runtime. Every
//! lifecycle operation on that object is serialized through a single actor,
//! so concurrent callers never race on the handle and nothing touches it
//! after it has been destroyed.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                           Server                              │
//! │  start() / stop() / dispose()        add_function_handler()   │
//! │           │                          add_transaction_handler()│
//! │           ▼                                   │               │
//! │  ┌──────────────────┐                         ▼               │
//! │  │  LifecycleActor  │              ┌────────────────────┐     │
//! │  │  (worker thread) │              │  FunctionRegistry  │     │
//! │  │                  │              └─────────┬──────────┘     │
//! │  │ Active(handle) ──┼── Dispose ──▶ Destroyed│                │
//! │  └────────┬─────────┘                        ▼                │
//! │           │                      ┌────────────────────┐       │
//! │           │  release_all() ─────▶│ PendingReferences  │       │
//! │           │                      └────────────────────┘       │
//! └───────────┼───────────────────────────────────────────────────┘
//!             ▼
//!      ┌──────────────┐
//!      │   Backend    │  create / launch / shutdown / destroy
//!      └──────────────┘  function and transaction registrations
//! ```
//!
//! # Core Concepts
//!
//! ## Lifecycle
//!
//! The actor holds either `Active(handle)` or `Destroyed`. Launch and
//! Shutdown keep the state; Dispose destroys the handle, releases every
//! pending reference, and is terminal. Messages after Dispose are answered
//! with [`ServerError::InvalidHandle`].
//!
//! ## Client connections
//!
//! Starting a server first opens and closes a client connection through the
//! configured factory. Until [`Server::add_connection_factory`] is called the
//! factory fails with `RFC_CLOSED`, so a server without a factory cannot be
//! started.
//!
//! ## Transactions
//!
//! A [`TransactionHandler`] receives the check, commit, rollback and confirm
//! phases of transactional calls. Phase results are reported back to the
//! backend as return codes.
//!
//! # Example
//!
//! ```rust,no_run
//! use rfcserver_core::{LoopbackBackend, Server, ServerParameters};
//! use std::sync::Arc;
//!
//! # async fn run() -> rfcserver_core::Result<()> {
//! let backend = LoopbackBackend::new();
//! let params = ServerParameters::new()
//!     .with("SYSID", "T01")
//!     .with("PROGRAM_ID", "RFCSERVER");
//!
//! let server = Server::create(Arc::new(backend.clone()), &params)?;
//! server.add_connection_factory({
//!     let factory = backend.connection_factory();
//!     move || factory()
//! });
//! server.start().await?;
//! server.stop(1000).await?;
//! server.dispose().await?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod function;
pub mod loopback;
pub mod references;
pub mod registry;
pub mod server;
pub mod transaction;

pub use actor::{LifecycleMessage, LifecycleState};
pub use backend::{Backend, ServerHandle};
pub use config::{ServerConfig, ServerParameters};
pub use connection::{
    default_factory, no_client_connection, ClientConnection, ConnectionAttributes,
    ConnectionFactory, NullConnection,
};
pub use error::{check_return, ConfigError, Result, ServerError};
pub use function::{
    FunctionDescriptor, FunctionHandler, ParameterDescriptor, ParameterDirection,
    SharedFunctionHandler,
};
pub use loopback::{BackendCall, BackendOp, LoopbackBackend};
pub use references::{on_dispose, Disposable, PendingReferences, RegistrationToken};
pub use registry::{FunctionRegistry, Registration};
pub use server::Server;
pub use transaction::{
    TransactionCallbacks, TransactionDispatch, TransactionHandler, TransactionState,
    TransactionTracker,
};

pub use rfcserver_types::{
    ConnectionHandle, FunctionName, RfcErrorGroup, RfcErrorInfo, RfcRc, SystemId, TransactionId,
    TransactionPhase, TransactionPhaseResult,
};
