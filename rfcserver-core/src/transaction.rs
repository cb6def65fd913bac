//! Transaction handler dispatch
//!
//! The backend drives transactional calls through four phases:
//!
//! ```text
//! NotStarted ──check──▶ Checked ──commit───▶ Committed  ──confirm──▶ Confirmed
//!                          └──────rollback──▶ RolledBack ──confirm──┘
//! ```
//!
//! This module adapts those phase callbacks onto a [`TransactionHandler`]
//! supplied by the application. It performs no business logic. The phase
//! sequence is owned by the backend and only observed here: the
//! [`TransactionTracker`] records what it sees and logs anything unexpected,
//! but every callback is forwarded, since the peer may replay phases or
//! deliver them on different threads.

use parking_lot::Mutex;
use rfcserver_types::{
    ConnectionHandle, RfcErrorInfo, RfcRc, TransactionId, TransactionPhase, TransactionPhaseResult,
};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Application capability invoked for each transaction phase
pub trait TransactionHandler: Send + Sync + 'static {
    /// Decide whether the transaction should be executed (it may be a replay)
    fn on_check(&self, connection: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult;

    fn on_commit(&self, connection: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult;

    fn on_rollback(&self, connection: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult;

    /// The peer has seen the outcome; state kept for the transaction can go
    fn on_confirm(&self, connection: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult;
}

/// One phase callback as installed in the backend runtime
pub type PhaseCallback =
    Arc<dyn Fn(ConnectionHandle, &TransactionId) -> TransactionPhaseResult + Send + Sync>;

/// The four callbacks registered with the backend for a system
#[derive(Clone)]
pub struct TransactionCallbacks {
    pub on_check: PhaseCallback,
    pub on_commit: PhaseCallback,
    pub on_rollback: PhaseCallback,
    pub on_confirm: PhaseCallback,
}

impl TransactionCallbacks {
    /// Invoke the callback for `phase`
    pub fn invoke(
        &self,
        phase: TransactionPhase,
        connection: ConnectionHandle,
        tid: &TransactionId,
    ) -> TransactionPhaseResult {
        let callback = match phase {
            TransactionPhase::Check => &self.on_check,
            TransactionPhase::Commit => &self.on_commit,
            TransactionPhase::Rollback => &self.on_rollback,
            TransactionPhase::Confirm => &self.on_confirm,
        };
        callback(connection, tid)
    }

    /// Return code reported to the native runtime for a phase
    pub fn invoke_rc(
        &self,
        phase: TransactionPhase,
        connection: ConnectionHandle,
        tid: &TransactionId,
    ) -> RfcRc {
        match self.invoke(phase, connection, tid) {
            Ok(()) => RfcRc::Ok,
            Err(err) => err.code,
        }
    }
}

impl fmt::Debug for TransactionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCallbacks").finish_non_exhaustive()
    }
}

/// Last phase observed for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Checked,
    Committed,
    RolledBack,
}

/// Observed state of in-flight transactions
#[derive(Default)]
pub struct TransactionTracker {
    states: Mutex<HashMap<TransactionId, TransactionState>>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a transaction; `None` if not started or confirmed
    pub fn state(&self, tid: &TransactionId) -> Option<TransactionState> {
        self.states.lock().get(tid).copied()
    }

    /// Number of transactions awaiting confirmation
    pub fn in_flight(&self) -> usize {
        self.states.lock().len()
    }

    /// Record a phase that completed successfully
    pub fn observe(&self, phase: TransactionPhase, tid: &TransactionId) {
        let mut states = self.states.lock();
        let previous = states.get(tid).copied();

        let next = match (phase, previous) {
            (TransactionPhase::Check, None) => Some(TransactionState::Checked),
            (TransactionPhase::Check, Some(state)) => {
                debug!(tid = %tid, ?state, "check replayed");
                Some(state)
            }
            (TransactionPhase::Commit, Some(TransactionState::Checked | TransactionState::Committed)) => {
                Some(TransactionState::Committed)
            }
            (TransactionPhase::Rollback, Some(TransactionState::Checked | TransactionState::RolledBack)) => {
                Some(TransactionState::RolledBack)
            }
            (TransactionPhase::Commit, _) => {
                warn!(tid = %tid, ?previous, "commit observed out of sequence");
                Some(TransactionState::Committed)
            }
            (TransactionPhase::Rollback, _) => {
                warn!(tid = %tid, ?previous, "rollback observed out of sequence");
                Some(TransactionState::RolledBack)
            }
            (TransactionPhase::Confirm, None) => {
                debug!(tid = %tid, "confirm for unknown transaction");
                None
            }
            (TransactionPhase::Confirm, Some(_)) => None,
        };

        match next {
            Some(state) => {
                states.insert(tid.clone(), state);
            }
            None => {
                states.remove(tid);
            }
        }
    }
}

/// Adapts backend phase callbacks onto a [`TransactionHandler`]
pub struct TransactionDispatch {
    handler: Arc<dyn TransactionHandler>,
    tracker: Arc<TransactionTracker>,
}

impl TransactionDispatch {
    pub fn new(handler: Arc<dyn TransactionHandler>, tracker: Arc<TransactionTracker>) -> Self {
        Self { handler, tracker }
    }

    /// Forward one phase to the handler
    ///
    /// A panicking handler is reported as an `RFC_EXTERNAL_FAILURE`; nothing
    /// unwinds into the backend runtime.
    pub fn dispatch(
        &self,
        phase: TransactionPhase,
        connection: ConnectionHandle,
        tid: &TransactionId,
    ) -> TransactionPhaseResult {
        let handler = &self.handler;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match phase {
            TransactionPhase::Check => handler.on_check(connection, tid),
            TransactionPhase::Commit => handler.on_commit(connection, tid),
            TransactionPhase::Rollback => handler.on_rollback(connection, tid),
            TransactionPhase::Confirm => handler.on_confirm(connection, tid),
        }));

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                error!(tid = %tid, %phase, "transaction handler panicked");
                Err(RfcErrorInfo::new(
                    RfcRc::ExternalFailure,
                    format!("transaction handler panicked during {}", phase),
                ))
            }
        };

        match &result {
            Ok(()) => self.tracker.observe(phase, tid),
            Err(err) => warn!(tid = %tid, %phase, error = %err, "transaction phase failed"),
        }
        result
    }

    /// Build the callback set to install in the backend
    pub fn into_callbacks(self) -> TransactionCallbacks {
        let dispatch = Arc::new(self);
        let phase_callback = |phase: TransactionPhase| -> PhaseCallback {
            let dispatch = dispatch.clone();
            Arc::new(move |connection: ConnectionHandle, tid: &TransactionId| dispatch.dispatch(phase, connection, tid))
        };

        TransactionCallbacks {
            on_check: phase_callback(TransactionPhase::Check),
            on_commit: phase_callback(TransactionPhase::Commit),
            on_rollback: phase_callback(TransactionPhase::Rollback),
            on_confirm: phase_callback(TransactionPhase::Confirm),
        }
    }
}
