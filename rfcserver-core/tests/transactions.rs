//! Transaction handlers registered through the server facade

use parking_lot::Mutex;
use rfcserver_core::{
    BackendCall, BackendOp, ConnectionHandle, LoopbackBackend, RfcErrorInfo, RfcRc, Server,
    ServerError, ServerParameters, SystemId, TransactionHandler, TransactionId, TransactionPhase,
    TransactionPhaseResult, TransactionState,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Idempotent posting: a transaction checked twice is executed once
#[derive(Default)]
struct LedgerState {
    seen: Mutex<HashSet<String>>,
    posted: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
struct Ledger(Arc<LedgerState>);

impl TransactionHandler for Ledger {
    fn on_check(&self, _c: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult {
        if self.0.seen.lock().insert(tid.to_string()) {
            Ok(())
        } else {
            Err(RfcErrorInfo::new(RfcRc::Executed, "transaction already executed"))
        }
    }

    fn on_commit(&self, _c: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult {
        self.0.posted.lock().push(tid.to_string());
        Ok(())
    }

    fn on_rollback(&self, _c: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult {
        self.0.posted.lock().retain(|t| t != tid.as_str());
        Ok(())
    }

    fn on_confirm(&self, _c: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult {
        self.0.seen.lock().remove(tid.as_str());
        Ok(())
    }
}

fn setup() -> (Server, LoopbackBackend, Ledger) {
    let backend = LoopbackBackend::new();
    let params = ServerParameters::new().with("SYSID", "T01");
    let server = Server::create(Arc::new(backend.clone()), &params).unwrap();
    let ledger = Ledger::default();
    server.add_transaction_handler(ledger.clone()).unwrap();
    (server, backend, ledger)
}

#[tokio::test]
async fn test_phases_reach_handler() {
    let (server, backend, ledger) = setup();
    let sys = SystemId::new("T01");
    let tid = TransactionId::new("AC1F0001");

    for phase in [TransactionPhase::Check, TransactionPhase::Commit] {
        assert_eq!(backend.drive_transaction(&sys, phase, &tid), RfcRc::Ok);
    }
    assert_eq!(server.transactions().state(&tid), Some(TransactionState::Committed));

    // replayed check is refused and reported to the peer
    assert_eq!(
        backend.drive_transaction(&sys, TransactionPhase::Check, &tid),
        RfcRc::Executed
    );

    assert_eq!(backend.drive_transaction(&sys, TransactionPhase::Confirm, &tid), RfcRc::Ok);
    assert_eq!(server.transactions().in_flight(), 0);
    assert_eq!(*ledger.0.posted.lock(), vec!["AC1F0001".to_string()]);

    server.dispose().await.unwrap();
}

#[tokio::test]
async fn test_rollback_path() {
    let (server, backend, ledger) = setup();
    let sys = SystemId::new("T01");
    let tid = TransactionId::generate();

    backend.drive_transaction(&sys, TransactionPhase::Check, &tid);
    backend.drive_transaction(&sys, TransactionPhase::Commit, &tid);
    backend.drive_transaction(&sys, TransactionPhase::Rollback, &tid);
    assert_eq!(server.transactions().state(&tid), Some(TransactionState::RolledBack));
    assert!(ledger.0.posted.lock().is_empty());

    server.dispose().await.unwrap();
}

#[tokio::test]
async fn test_handlers_released_after_destroy() {
    let (server, backend, _ledger) = setup();
    let sys = SystemId::new("T01");
    assert!(backend.has_transaction_handlers(&sys));

    server.dispose().await.unwrap();

    assert!(!backend.has_transaction_handlers(&sys));
    let calls = backend.calls();
    let destroy = calls.iter().position(|c| *c == BackendCall::Destroy(1));
    let release = calls
        .iter()
        .position(|c| *c == BackendCall::ReleaseTransactionHandlers("T01".into()));
    assert!(destroy.is_some() && release.is_some());
    assert!(destroy < release);
    let releases = calls
        .iter()
        .filter(|c| **c == BackendCall::ReleaseTransactionHandlers("T01".into()))
        .count();
    assert_eq!(releases, 1);

    let tid = TransactionId::new("LATE");
    assert_eq!(
        backend.drive_transaction(&sys, TransactionPhase::Check, &tid),
        RfcRc::NotFound
    );
}

#[tokio::test]
async fn test_registration_failure_is_reported() {
    let backend = LoopbackBackend::new();
    let params = ServerParameters::new().with("SYSID", "T01");
    let server = Server::create(Arc::new(backend.clone()), &params).unwrap();
    backend.fail_next(
        BackendOp::AddTransactionHandlers,
        RfcErrorInfo::new(RfcRc::MemoryInsufficient, "no slots"),
    );

    let err = server
        .add_transaction_handler(Ledger::default())
        .unwrap_err();
    assert!(matches!(err, ServerError::BackendFailure(ref info) if info.code == RfcRc::MemoryInsufficient));
    assert!(!backend.has_transaction_handlers(&SystemId::new("T01")));

    server.dispose().await.unwrap();
}
