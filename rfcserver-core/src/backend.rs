//! Backend runtime primitives consumed by the server
//!
//! The native transport opens sockets, marshals parameters and drives the
//! transaction protocol. This crate only sequences lifecycle operations
//! against it, so the runtime is reduced to the [`Backend`] trait: a handful
//! of atomic calls that report failure through [`RfcErrorInfo`] and never
//! unwind.

use crate::config::ServerParameters;
use crate::function::{FunctionDescriptor, SharedFunctionHandler};
use crate::references::RegistrationToken;
use crate::transaction::TransactionCallbacks;
use rfcserver_types::{RfcErrorInfo, SystemId};
use std::fmt;

/// Opaque handle of a server listener created by the backend
///
/// Not `Clone`: destroying the server consumes the handle, so a destroyed
/// handle cannot be used again.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ServerHandle(u64);

impl ServerHandle {
    /// Wrap a raw handle value issued by the backend runtime
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server:{:#x}", self.0)
    }
}

/// Lifecycle and registration primitives of the backend runtime
pub trait Backend: Send + Sync + 'static {
    fn create_server(&self, params: &ServerParameters) -> Result<ServerHandle, RfcErrorInfo>;

    /// Start listening for inbound calls
    fn launch_server(&self, handle: &ServerHandle) -> Result<(), RfcErrorInfo>;

    /// Stop listening, waiting up to `timeout_ms` for running calls
    fn shutdown_server(&self, handle: &ServerHandle, timeout_ms: u32) -> Result<(), RfcErrorInfo>;

    /// Release the native server resource
    fn destroy_server(&self, handle: ServerHandle) -> Result<(), RfcErrorInfo>;

    fn add_function_handler(
        &self,
        system_id: &SystemId,
        descriptor: &FunctionDescriptor,
        handler: SharedFunctionHandler,
    ) -> Result<RegistrationToken, RfcErrorInfo>;

    /// Install the four transaction phase callbacks for a system
    fn add_transaction_handlers(
        &self,
        system_id: &SystemId,
        callbacks: TransactionCallbacks,
    ) -> Result<RegistrationToken, RfcErrorInfo>;
}
