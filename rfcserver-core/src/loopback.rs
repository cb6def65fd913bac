//! In-memory backend runtime
//!
//! `LoopbackBackend` implements [`Backend`] without any native library. It
//! journals every primitive it receives, can be scripted to fail, and lets
//! callers drive registered function handlers and transaction phases as if
//! the remote peer had called in. The CLI uses it to exercise a server end
//! to end; tests use it to observe ordering.

use crate::backend::{Backend, ServerHandle};
use crate::config::ServerParameters;
use crate::connection::{ClientConnection, ConnectionAttributes, ConnectionFactory};
use crate::function::{FunctionDescriptor, SharedFunctionHandler};
use crate::references::{on_dispose, RegistrationToken};
use crate::transaction::TransactionCallbacks;
use parking_lot::Mutex;
use rfcserver_types::{
    ConnectionHandle, FunctionName, RfcErrorInfo, RfcRc, SystemId, TransactionId, TransactionPhase,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A primitive received by the loopback backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Create(String),
    Launch(u64),
    Shutdown(u64, u32),
    Destroy(u64),
    AddFunction(String, String),
    ReleaseFunction(String, String),
    AddTransactionHandlers(String),
    ReleaseTransactionHandlers(String),
    OpenConnection,
    CloseConnection,
}

/// Primitive that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    Create,
    Launch,
    Shutdown,
    Destroy,
    AddFunction,
    AddTransactionHandlers,
    OpenConnection,
}

#[derive(Default)]
struct LoopbackState {
    calls: Mutex<Vec<BackendCall>>,
    failures: Mutex<HashMap<BackendOp, VecDeque<RfcErrorInfo>>>,
    functions: Mutex<HashMap<(SystemId, FunctionName), (FunctionDescriptor, SharedFunctionHandler)>>,
    transactions: Mutex<HashMap<SystemId, TransactionCallbacks>>,
    next_handle: AtomicU64,
    next_connection: AtomicU64,
}

impl LoopbackState {
    fn record(&self, call: BackendCall) {
        debug!(?call, "loopback backend call");
        self.calls.lock().push(call);
    }

    fn scripted_failure(&self, op: BackendOp) -> Result<(), RfcErrorInfo> {
        match self.failures.lock().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory implementation of the backend runtime
#[derive(Clone, Default)]
pub struct LoopbackBackend {
    state: Arc<LoopbackState>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primitives received so far, in order
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.state.calls.lock().clear();
    }

    /// Make the next call of `op` fail with `err`
    pub fn fail_next(&self, op: BackendOp, err: RfcErrorInfo) {
        self.fail_times(op, err, 1);
    }

    /// Make the next `times` calls of `op` fail with `err`
    pub fn fail_times(&self, op: BackendOp, err: RfcErrorInfo, times: usize) {
        let mut failures = self.state.failures.lock();
        let queue = failures.entry(op).or_default();
        queue.extend(std::iter::repeat(err).take(times));
    }

    /// Connection factory opening loopback client connections
    pub fn connection_factory(&self) -> ConnectionFactory {
        let state = self.state.clone();
        Arc::new(move || -> Result<Box<dyn ClientConnection>, RfcErrorInfo> {
            state.scripted_failure(BackendOp::OpenConnection)?;
            state.record(BackendCall::OpenConnection);
            Ok(Box::new(LoopbackConnection { state: state.clone() }) as Box<dyn ClientConnection>)
        })
    }

    pub fn is_function_installed(&self, system_id: &SystemId, name: &FunctionName) -> bool {
        self.state
            .functions
            .lock()
            .contains_key(&(system_id.clone(), name.clone()))
    }

    pub fn has_transaction_handlers(&self, system_id: &SystemId) -> bool {
        self.state.transactions.lock().contains_key(system_id)
    }

    /// Call a registered function as the remote peer would
    pub fn call_function(&self, system_id: &SystemId, name: &FunctionName) -> Result<(), RfcErrorInfo> {
        let entry = self
            .state
            .functions
            .lock()
            .get(&(system_id.clone(), name.clone()))
            .map(|(desc, handler)| (desc.clone(), handler.clone()));

        match entry {
            Some((descriptor, handler)) => {
                let connection = ConnectionHandle(self.state.next_connection.fetch_add(1, Ordering::SeqCst) + 1);
                handler.handle(connection, &descriptor)
            }
            None => Err(RfcErrorInfo::new(
                RfcRc::NotFound,
                format!("function {} not registered for {}", name, system_id),
            )),
        }
    }

    /// Deliver a transaction phase as the remote peer would
    ///
    /// Returns the code handed back to the peer; `RFC_NOT_FOUND` when no
    /// handlers are installed for the system.
    pub fn drive_transaction(&self, system_id: &SystemId, phase: TransactionPhase, tid: &TransactionId) -> RfcRc {
        let callbacks = self.state.transactions.lock().get(system_id).cloned();
        match callbacks {
            Some(callbacks) => callbacks.invoke_rc(phase, ConnectionHandle(0), tid),
            None => RfcRc::NotFound,
        }
    }
}

impl Backend for LoopbackBackend {
    fn create_server(&self, params: &ServerParameters) -> Result<ServerHandle, RfcErrorInfo> {
        self.state.scripted_failure(BackendOp::Create)?;
        let sysid = params.get(crate::config::SYSID).unwrap_or_default().to_string();
        self.state.record(BackendCall::Create(sysid));
        let raw = self.state.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ServerHandle::from_raw(raw))
    }

    fn launch_server(&self, handle: &ServerHandle) -> Result<(), RfcErrorInfo> {
        self.state.scripted_failure(BackendOp::Launch)?;
        self.state.record(BackendCall::Launch(handle.raw()));
        Ok(())
    }

    fn shutdown_server(&self, handle: &ServerHandle, timeout_ms: u32) -> Result<(), RfcErrorInfo> {
        self.state.scripted_failure(BackendOp::Shutdown)?;
        self.state.record(BackendCall::Shutdown(handle.raw(), timeout_ms));
        Ok(())
    }

    fn destroy_server(&self, handle: ServerHandle) -> Result<(), RfcErrorInfo> {
        // the handle is gone whether or not the native call reports success
        self.state.record(BackendCall::Destroy(handle.raw()));
        self.state.scripted_failure(BackendOp::Destroy)
    }

    fn add_function_handler(
        &self,
        system_id: &SystemId,
        descriptor: &FunctionDescriptor,
        handler: SharedFunctionHandler,
    ) -> Result<RegistrationToken, RfcErrorInfo> {
        self.state.scripted_failure(BackendOp::AddFunction)?;
        let key = (system_id.clone(), descriptor.name.clone());
        self.state
            .functions
            .lock()
            .insert(key.clone(), (descriptor.clone(), handler));
        self.state.record(BackendCall::AddFunction(
            system_id.to_string(),
            descriptor.name.to_string(),
        ));

        let state = self.state.clone();
        Ok(on_dispose(format!("function {}", descriptor.name), move || {
            state.functions.lock().remove(&key);
            state.record(BackendCall::ReleaseFunction(key.0.to_string(), key.1.to_string()));
        }))
    }

    fn add_transaction_handlers(
        &self,
        system_id: &SystemId,
        callbacks: TransactionCallbacks,
    ) -> Result<RegistrationToken, RfcErrorInfo> {
        self.state.scripted_failure(BackendOp::AddTransactionHandlers)?;
        self.state
            .transactions
            .lock()
            .insert(system_id.clone(), callbacks);
        self.state
            .record(BackendCall::AddTransactionHandlers(system_id.to_string()));

        let state = self.state.clone();
        let system_id = system_id.clone();
        Ok(on_dispose(format!("transaction handlers {}", system_id), move || {
            state.transactions.lock().remove(&system_id);
            state.record(BackendCall::ReleaseTransactionHandlers(system_id.to_string()));
        }))
    }
}

/// Client connection opened by [`LoopbackBackend::connection_factory`]
pub struct LoopbackConnection {
    state: Arc<LoopbackState>,
}

impl ClientConnection for LoopbackConnection {
    fn ping(&mut self) -> Result<(), RfcErrorInfo> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), RfcErrorInfo> {
        Ok(())
    }

    fn commit_and_wait(&mut self) -> Result<(), RfcErrorInfo> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), RfcErrorInfo> {
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), RfcErrorInfo> {
        Ok(())
    }

    fn attributes(&self) -> Result<ConnectionAttributes, RfcErrorInfo> {
        Ok(ConnectionAttributes {
            partner_host: "loopback".into(),
            ..Default::default()
        })
    }

    fn close(self: Box<Self>) -> Result<(), RfcErrorInfo> {
        self.state.record(BackendCall::CloseConnection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_failures_are_consumed() {
        let backend = LoopbackBackend::new();
        let params = ServerParameters::new().with("SYSID", "T01");
        backend.fail_times(BackendOp::Create, RfcErrorInfo::new(RfcRc::LogonFailure, "bad user"), 2);

        assert_eq!(backend.create_server(&params).unwrap_err().code, RfcRc::LogonFailure);
        assert_eq!(backend.create_server(&params).unwrap_err().code, RfcRc::LogonFailure);
        let handle = backend.create_server(&params).unwrap();
        assert_eq!(handle.raw(), 1);
        assert_eq!(backend.calls(), vec![BackendCall::Create("T01".into())]);
    }

    #[test]
    fn test_connection_factory_journals_open_and_close() {
        let backend = LoopbackBackend::new();
        let factory = backend.connection_factory();

        let mut conn = factory().unwrap();
        conn.ping().unwrap();
        assert_eq!(conn.attributes().unwrap().partner_host, "loopback");
        conn.close().unwrap();

        backend.fail_next(BackendOp::OpenConnection, RfcErrorInfo::new(RfcRc::CommunicationFailure, "down"));
        assert!(factory().is_err());

        assert_eq!(
            backend.calls(),
            vec![BackendCall::OpenConnection, BackendCall::CloseConnection]
        );
    }

    #[test]
    fn test_function_token_unregisters() {
        let backend = LoopbackBackend::new();
        let sys = SystemId::new("T01");
        let name = FunctionName::new("Z_PING");
        let handler: SharedFunctionHandler =
            Arc::new(|_c: ConnectionHandle, _f: &FunctionDescriptor| Ok::<(), RfcErrorInfo>(()));

        let token = backend
            .add_function_handler(&sys, &FunctionDescriptor::new("Z_PING"), handler)
            .unwrap();
        assert!(backend.call_function(&sys, &name).is_ok());

        token.dispose();
        assert!(!backend.is_function_installed(&sys, &name));
        assert_eq!(backend.call_function(&sys, &name).unwrap_err().code, RfcRc::NotFound);
    }

    #[test]
    fn test_drive_transaction_without_handlers() {
        let backend = LoopbackBackend::new();
        let rc = backend.drive_transaction(&SystemId::new("T01"), TransactionPhase::Check, &TransactionId::new("T"));
        assert_eq!(rc, RfcRc::NotFound);
    }
}
