//! Lifecycle actor owning the backend server handle
//!
//! All lifecycle operations on a server run on one dedicated worker thread
//! that drains an unbounded queue. Exactly one message is processed at a
//! time, in arrival order, and each step yields the next state plus the reply
//! for the sender. Callers await their reply without blocking the worker.
//!
//! ```text
//!   start() ─┐
//!   stop()  ─┼─▶ [ Launch | Shutdown | Dispose ] ─▶ worker ─▶ Backend
//!   drop()  ─┘          unbounded queue             (state)
//! ```
//!
//! Backend primitives block, so the worker is a plain thread and needs no
//! tokio runtime; only the callers await.

use crate::backend::{Backend, ServerHandle};
use crate::connection::ConnectionFactory;
use crate::error::{Result, ServerError};
use crate::references::PendingReferences;
use parking_lot::RwLock;
use rfcserver_types::SystemId;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Messages understood by the lifecycle actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleMessage {
    /// Verify the backend is reachable, then start listening
    Launch,
    /// Stop listening, waiting up to `timeout_ms` for running calls
    Shutdown { timeout_ms: u32 },
    /// Destroy the handle and release every pending reference
    Dispose { reason: String },
}

impl LifecycleMessage {
    fn name(&self) -> &'static str {
        match self {
            LifecycleMessage::Launch => "launch",
            LifecycleMessage::Shutdown { .. } => "shutdown",
            LifecycleMessage::Dispose { .. } => "dispose",
        }
    }
}

/// State of the server object held by the actor
#[derive(Debug)]
pub enum LifecycleState {
    Active(ServerHandle),
    Destroyed,
}

impl LifecycleState {
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active(_))
    }
}

struct Envelope {
    message: LifecycleMessage,
    reply: Option<oneshot::Sender<Result<()>>>,
}

/// Collaborators the worker needs to process messages
pub(crate) struct LifecycleContext {
    pub system_id: SystemId,
    pub backend: Arc<dyn Backend>,
    pub factory: Arc<RwLock<ConnectionFactory>>,
    pub references: Arc<PendingReferences>,
    /// Flipped to `true` once disposal has finished
    pub destroyed: watch::Sender<bool>,
}

/// Sending side of the lifecycle actor
pub(crate) struct LifecycleActor {
    sender: Option<mpsc::UnboundedSender<Envelope>>,
    worker: Option<JoinHandle<()>>,
}

impl LifecycleActor {
    /// Spawn the worker thread owning `handle`
    pub fn spawn(context: LifecycleContext, handle: ServerHandle) -> Result<Self> {
        let (sender, inbox) = mpsc::unbounded_channel();
        let name = format!("rfcserver-{}", context.system_id);
        let worker = Worker { context };
        let state = LifecycleState::Active(handle);

        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || worker.run(inbox, state))
            .map_err(|e| ServerError::InternalError(format!("failed to spawn lifecycle worker: {}", e)))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Enqueue a message and wait for its reply
    pub async fn ask(&self, message: LifecycleMessage) -> Result<()> {
        let reply = self.enqueue(message)?;
        reply
            .await
            .unwrap_or_else(|_| Err(ServerError::InternalError("lifecycle worker dropped the reply".into())))
    }

    /// Like [`ask`](Self::ask), but stop waiting when `cancel` fires
    ///
    /// Cancelling only abandons the wait. A message already queued is still
    /// processed so the server state stays consistent.
    pub async fn ask_with_cancel(&self, message: LifecycleMessage, cancel: &CancellationToken) -> Result<()> {
        let reply = self.enqueue(message)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ServerError::Cancelled),
            outcome = reply => outcome
                .unwrap_or_else(|_| Err(ServerError::InternalError("lifecycle worker dropped the reply".into()))),
        }
    }

    /// Enqueue a message without waiting for it
    pub fn tell(&self, message: LifecycleMessage) -> bool {
        match &self.sender {
            Some(sender) => sender.send(Envelope { message, reply: None }).is_ok(),
            None => false,
        }
    }

    fn enqueue(&self, message: LifecycleMessage) -> Result<oneshot::Receiver<Result<()>>> {
        let sender = self.sender.as_ref().ok_or(ServerError::InvalidHandle)?;
        let (tx, rx) = oneshot::channel();
        sender
            .send(Envelope {
                message,
                reply: Some(tx),
            })
            .map_err(|_| ServerError::InvalidHandle)?;
        Ok(rx)
    }
}

impl Drop for LifecycleActor {
    fn drop(&mut self) {
        // closing the queue lets the worker drain what is left and exit
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                error!("lifecycle worker panicked");
            }
        }
    }
}

struct Worker {
    context: LifecycleContext,
}

impl Worker {
    fn run(self, mut inbox: mpsc::UnboundedReceiver<Envelope>, mut state: LifecycleState) {
        debug!(system_id = %self.context.system_id, "lifecycle worker started");

        while let Some(Envelope { message, reply }) = inbox.blocking_recv() {
            let (next, result) = self.step(state, message);
            state = next;
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }

        // queue closed without a Dispose: release what is still owned
        if state.is_active() {
            warn!(system_id = %self.context.system_id, "lifecycle queue closed while server active");
            let _ = self.step(
                state,
                LifecycleMessage::Dispose {
                    reason: "lifecycle queue closed".into(),
                },
            );
        }
        debug!(system_id = %self.context.system_id, "lifecycle worker stopped");
    }

    /// Process one message against the current state
    fn step(&self, state: LifecycleState, message: LifecycleMessage) -> (LifecycleState, Result<()>) {
        debug!(system_id = %self.context.system_id, message = message.name(), "processing lifecycle message");

        match (state, message) {
            (LifecycleState::Destroyed, message) => {
                debug!(message = message.name(), "message for destroyed server");
                (LifecycleState::Destroyed, Err(ServerError::InvalidHandle))
            }
            (LifecycleState::Active(handle), LifecycleMessage::Launch) => {
                let result = self.guarded("launch", || self.launch(&handle));
                (LifecycleState::Active(handle), result)
            }
            (LifecycleState::Active(handle), LifecycleMessage::Shutdown { timeout_ms }) => {
                let result = self.guarded("shutdown", || self.shutdown(&handle, timeout_ms));
                (LifecycleState::Active(handle), result)
            }
            (LifecycleState::Active(handle), LifecycleMessage::Dispose { reason }) => {
                self.dispose(handle);
                (LifecycleState::Destroyed, Err(ServerError::ServerDestroyed(reason)))
            }
        }
    }

    fn launch(&self, handle: &ServerHandle) -> Result<()> {
        let factory = self.context.factory.read().clone();
        let connection = factory().map_err(|err| {
            warn!(system_id = %self.context.system_id, error = %err, "verification connection failed");
            ServerError::ConnectionFailure(err)
        })?;
        if let Err(err) = connection.close() {
            debug!(error = %err, "closing verification connection failed");
        }

        self.context.backend.launch_server(handle).map_err(|err| {
            warn!(system_id = %self.context.system_id, %handle, error = %err, "launch failed");
            ServerError::BackendFailure(err)
        })?;
        info!(system_id = %self.context.system_id, %handle, "server launched");
        Ok(())
    }

    fn shutdown(&self, handle: &ServerHandle, timeout_ms: u32) -> Result<()> {
        self.context
            .backend
            .shutdown_server(handle, timeout_ms)
            .map_err(|err| {
                warn!(system_id = %self.context.system_id, %handle, timeout_ms, error = %err, "shutdown failed");
                ServerError::BackendFailure(err)
            })?;
        info!(system_id = %self.context.system_id, %handle, timeout_ms, "server shut down");
        Ok(())
    }

    /// Destroy the handle, then release references; both steps best-effort
    fn dispose(&self, handle: ServerHandle) {
        let system_id = &self.context.system_id;
        let label = handle.to_string();

        match self.guarded("destroy", || {
            self.context
                .backend
                .destroy_server(handle)
                .map_err(ServerError::BackendFailure)
        }) {
            Ok(()) => info!(system_id = %system_id, handle = %label, "server destroyed"),
            Err(err) => warn!(system_id = %system_id, handle = %label, error = %err, "destroying server failed"),
        }

        let released = self.context.references.release_all();
        info!(system_id = %system_id, released, "pending references released");
        self.context.destroyed.send_replace(true);
    }

    /// Run `f`, turning a panic into `InternalError`
    fn guarded<F>(&self, operation: &str, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(system_id = %self.context.system_id, operation, %detail, "lifecycle operation panicked");
            Err(ServerError::InternalError(format!("{} panicked: {}", operation, detail)))
        })
    }
}
