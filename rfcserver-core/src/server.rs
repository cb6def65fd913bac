//! Public server facade
//!
//! [`Server`] wraps the lifecycle actor. Start, stop and dispose are routed
//! through the actor's queue; the connection factory and the pending
//! references live beside it. Function and transaction handlers are often
//! registered while the server is being set up, outside the actor's message
//! flow, so the pending references carry their own lock.

use crate::actor::{LifecycleActor, LifecycleContext, LifecycleMessage};
use crate::backend::Backend;
use crate::config::ServerParameters;
use crate::connection::{default_factory, ClientConnection, ConnectionFactory};
use crate::error::{Result, ServerError};
use crate::function::{FunctionDescriptor, FunctionHandler};
use crate::references::{Disposable, PendingReferences};
use crate::registry::{FunctionRegistry, Registration, RegistryReference};
use crate::transaction::{TransactionDispatch, TransactionHandler, TransactionTracker};
use parking_lot::RwLock;
use rfcserver_types::{FunctionName, RfcErrorInfo, SystemId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// An inbound RFC server bound to one logical system
///
/// Call [`dispose`](Server::dispose) when done. Dropping the server sends the
/// same Dispose message and waits for the worker to finish it, so the native
/// handle and every registration are released on all exit paths.
pub struct Server {
    system_id: SystemId,
    backend: Arc<dyn Backend>,
    factory: Arc<RwLock<ConnectionFactory>>,
    references: Arc<PendingReferences>,
    functions: Arc<FunctionRegistry>,
    transactions: Arc<TransactionTracker>,
    disposed: AtomicBool,
    destroyed: watch::Receiver<bool>,
    actor: LifecycleActor,
}

impl Server {
    /// Create a server through the backend runtime
    ///
    /// Fails fast with [`ConfigError::MissingSystemId`] when `SYSID` is absent,
    /// before the backend is called.
    ///
    /// [`ConfigError::MissingSystemId`]: crate::error::ConfigError::MissingSystemId
    pub fn create(backend: Arc<dyn Backend>, params: &ServerParameters) -> Result<Self> {
        let system_id = params.system_id()?;
        let handle = backend
            .create_server(params)
            .map_err(ServerError::BackendFailure)?;
        info!(system_id = %system_id, %handle, "server created");

        let functions = Arc::new(FunctionRegistry::new());
        let references = Arc::new(PendingReferences::new());
        references.push(Box::new(RegistryReference(functions.clone())));

        let factory = Arc::new(RwLock::new(default_factory()));
        let (signal, destroyed) = watch::channel(false);
        let actor = LifecycleActor::spawn(
            LifecycleContext {
                system_id: system_id.clone(),
                backend: backend.clone(),
                factory: factory.clone(),
                references: references.clone(),
                destroyed: signal,
            },
            handle,
        )?;

        Ok(Self {
            system_id,
            backend,
            factory,
            references,
            functions,
            transactions: Arc::new(TransactionTracker::new()),
            disposed: AtomicBool::new(false),
            destroyed,
            actor,
        })
    }

    pub fn system_id(&self) -> &SystemId {
        &self.system_id
    }

    /// Verify the backend is reachable and start listening
    #[instrument(skip(self), fields(system_id = %self.system_id))]
    pub async fn start(&self) -> Result<()> {
        self.actor.ask(LifecycleMessage::Launch).await
    }

    /// [`start`](Server::start), abandoning the wait when `cancel` fires
    pub async fn start_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        self.actor
            .ask_with_cancel(LifecycleMessage::Launch, cancel)
            .await
    }

    /// Stop listening; `timeout_ms` of 0 stops without waiting
    #[instrument(skip(self), fields(system_id = %self.system_id))]
    pub async fn stop(&self, timeout_ms: u32) -> Result<()> {
        self.actor
            .ask(LifecycleMessage::Shutdown { timeout_ms })
            .await
    }

    pub async fn stop_with_cancel(&self, timeout_ms: u32, cancel: &CancellationToken) -> Result<()> {
        self.actor
            .ask_with_cancel(LifecycleMessage::Shutdown { timeout_ms }, cancel)
            .await
    }

    /// Replace the factory used for client connections
    ///
    /// Meant to be called during setup, before the server is started.
    pub fn add_connection_factory<F>(&self, factory: F)
    where
        F: Fn() -> std::result::Result<Box<dyn ClientConnection>, RfcErrorInfo> + Send + Sync + 'static,
    {
        *self.factory.write() = Arc::new(factory);
    }

    /// Open a client connection through the current factory
    pub fn open_client_connection(&self) -> std::result::Result<Box<dyn ClientConnection>, RfcErrorInfo> {
        let factory = self.factory.read().clone();
        factory()
    }

    /// Hand references to the server, to be released when it is disposed
    ///
    /// References added after disposal are released immediately.
    pub fn add_references<I>(&self, references: I)
    where
        I: IntoIterator<Item = Box<dyn Disposable>>,
    {
        self.references.extend(references);
    }

    /// Register a function handler with the backend
    ///
    /// Registering a name that is already registered for this system is a
    /// no-op and does not reach the backend. Fails with
    /// [`ServerError::InvalidHandle`] once the server has been disposed.
    pub fn add_function_handler<H>(&self, descriptor: FunctionDescriptor, handler: H) -> Result<()>
    where
        H: FunctionHandler,
    {
        self.ensure_not_disposed()?;
        let name = descriptor.name.clone();
        let handler = Arc::new(handler);
        let registration = self.functions.register_with(&self.system_id, &name, || {
            self.backend
                .add_function_handler(&self.system_id, &descriptor, handler)
                .map_err(ServerError::BackendFailure)
        })?;

        match registration {
            Registration::Created => {
                info!(system_id = %self.system_id, function = %name, "function handler registered");
                Ok(())
            }
            Registration::AlreadyRegistered => {
                debug!(system_id = %self.system_id, function = %name, "function handler already registered");
                Ok(())
            }
            Registration::Released => Err(ServerError::InvalidHandle),
        }
    }

    pub fn is_function_registered(&self, name: &FunctionName) -> bool {
        self.functions.is_registered(&self.system_id, name)
    }

    /// Install the transaction phase callbacks for this server's system
    ///
    /// The registration token joins the pending references and is released
    /// when the server is disposed, after the handle has been destroyed.
    pub fn add_transaction_handler<H>(&self, handler: H) -> Result<()>
    where
        H: TransactionHandler,
    {
        self.ensure_not_disposed()?;
        let dispatch = TransactionDispatch::new(Arc::new(handler), self.transactions.clone());
        let token = self
            .backend
            .add_transaction_handlers(&self.system_id, dispatch.into_callbacks())
            .map_err(ServerError::BackendFailure)?;
        self.references.push(token);
        info!(system_id = %self.system_id, "transaction handlers registered");
        Ok(())
    }

    /// Transactions observed by the installed transaction handlers
    pub fn transactions(&self) -> &TransactionTracker {
        &self.transactions
    }

    /// Destroy the server and release every registration
    ///
    /// Only the first call sends the Dispose message. Every call, including
    /// concurrent ones, returns once the handle has been destroyed and the
    /// pending references have been released.
    #[instrument(skip(self), fields(system_id = %self.system_id))]
    pub async fn dispose(&self) -> Result<()> {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            let reason = "disposed".to_string();
            match self.actor.ask(LifecycleMessage::Dispose { reason }).await {
                Ok(()) | Err(ServerError::ServerDestroyed(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let mut destroyed = self.destroyed.clone();
        destroyed
            .wait_for(|done| *done)
            .await
            .map(|_| ())
            .map_err(|_| ServerError::InternalError("lifecycle worker stopped before disposal completed".into()))
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            Err(ServerError::InvalidHandle)
        } else {
            Ok(())
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!(system_id = %self.system_id, "server dropped without dispose");
            self.actor.tell(LifecycleMessage::Dispose {
                reason: "server dropped".into(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{BackendCall, LoopbackBackend};
    use crate::error::ConfigError;
    use rfcserver_types::{ConnectionHandle, RfcRc};

    fn params() -> ServerParameters {
        ServerParameters::new().with("SYSID", "T01")
    }

    #[test]
    fn test_create_requires_sysid() {
        let backend = Arc::new(LoopbackBackend::new());
        let err = Server::create(backend.clone(), &ServerParameters::new().with("GWHOST", "localhost"))
            .err()
            .expect("creation must fail");
        assert!(matches!(err, ServerError::Config(ConfigError::MissingSystemId)));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_create_failure_is_backend_failure() {
        let backend = Arc::new(LoopbackBackend::new());
        backend.fail_next(
            crate::loopback::BackendOp::Create,
            RfcErrorInfo::new(RfcRc::InvalidParameter, "PROGRAM_ID missing"),
        );
        let err = Server::create(backend, &params()).err().expect("creation must fail");
        assert_eq!(err.error_info().map(|e| e.code), Some(RfcRc::InvalidParameter));
    }

    #[test]
    fn test_open_client_connection_defaults_to_closed() {
        let backend = Arc::new(LoopbackBackend::new());
        let server = Server::create(backend, &params()).unwrap();

        let err = server.open_client_connection().err().expect("no factory configured");
        assert_eq!(err.code, RfcRc::Closed);
    }

    #[test]
    fn test_function_registration_is_idempotent() {
        let backend = Arc::new(LoopbackBackend::new());
        let server = Server::create(backend.clone(), &params()).unwrap();
        let name = FunctionName::new("FOO");

        let handler = |_c: ConnectionHandle, _f: &FunctionDescriptor| Ok::<(), RfcErrorInfo>(());
        assert!(!server.is_function_registered(&name));
        server.add_function_handler(FunctionDescriptor::new("FOO"), handler).unwrap();
        assert!(server.is_function_registered(&name));
        server.add_function_handler(FunctionDescriptor::new("foo"), handler).unwrap();

        let adds = backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, BackendCall::AddFunction(..)))
            .count();
        assert_eq!(adds, 1);
    }

    #[test]
    fn test_registration_racing_disposal_is_invalid_handle() {
        let backend = Arc::new(LoopbackBackend::new());
        let server = Server::create(backend.clone(), &params()).unwrap();
        // the worker released the registry before the facade flag was observed
        server.functions.release_all();

        let handler = |_c: ConnectionHandle, _f: &FunctionDescriptor| Ok::<(), RfcErrorInfo>(());
        assert!(matches!(
            server.add_function_handler(FunctionDescriptor::new("FOO"), handler),
            Err(ServerError::InvalidHandle)
        ));
        assert!(!backend
            .calls()
            .iter()
            .any(|c| matches!(c, BackendCall::AddFunction(..))));
    }

    #[test]
    fn test_drop_disposes() {
        let backend = Arc::new(LoopbackBackend::new());
        let server = Server::create(backend.clone(), &params()).unwrap();
        drop(server);

        assert_eq!(
            backend.calls(),
            vec![BackendCall::Create("T01".into()), BackendCall::Destroy(1)]
        );
    }

    #[tokio::test]
    async fn test_operations_after_dispose() {
        let backend = Arc::new(LoopbackBackend::new());
        let server = Server::create(backend.clone(), &params()).unwrap();
        server.dispose().await.unwrap();

        assert!(matches!(server.start().await, Err(ServerError::InvalidHandle)));
        assert!(matches!(server.stop(0).await, Err(ServerError::InvalidHandle)));
        let handler = |_c: ConnectionHandle, _f: &FunctionDescriptor| Ok::<(), RfcErrorInfo>(());
        assert!(matches!(
            server.add_function_handler(FunctionDescriptor::new("FOO"), handler),
            Err(ServerError::InvalidHandle)
        ));
        server.dispose().await.unwrap();
    }
}
