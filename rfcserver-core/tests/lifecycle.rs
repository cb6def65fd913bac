//! End-to-end lifecycle behaviour against the loopback backend

use parking_lot::Mutex;
use rfcserver_core::{
    on_dispose, BackendCall, BackendOp, ConnectionHandle, FunctionDescriptor, FunctionName,
    LoopbackBackend, RfcErrorInfo, RfcRc, Server, ServerError, ServerParameters, SystemId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn t01() -> ServerParameters {
    ServerParameters::new()
        .with("SYSID", "T01")
        .with("PROGRAM_ID", "RFCSERVER")
}

fn server_with_loopback() -> (Server, LoopbackBackend) {
    let backend = LoopbackBackend::new();
    let server = Server::create(Arc::new(backend.clone()), &t01()).unwrap();
    let factory = backend.connection_factory();
    server.add_connection_factory(move || factory());
    (server, backend)
}

fn noop(_c: ConnectionHandle, _f: &FunctionDescriptor) -> Result<(), RfcErrorInfo> {
    Ok(())
}

#[tokio::test]
async fn test_full_lifecycle_on_t01() {
    let (server, backend) = server_with_loopback();
    server
        .add_function_handler(FunctionDescriptor::new("Z_PING"), noop)
        .unwrap();

    server.start().await.unwrap();
    backend
        .call_function(&SystemId::new("T01"), &FunctionName::new("Z_PING"))
        .unwrap();
    server.stop(500).await.unwrap();
    server.dispose().await.unwrap();

    assert_eq!(
        backend.calls(),
        vec![
            BackendCall::Create("T01".into()),
            BackendCall::AddFunction("T01".into(), "Z_PING".into()),
            BackendCall::OpenConnection,
            BackendCall::CloseConnection,
            BackendCall::Launch(1),
            BackendCall::Shutdown(1, 500),
            BackendCall::Destroy(1),
            BackendCall::ReleaseFunction("T01".into(), "Z_PING".into()),
        ]
    );
}

#[tokio::test]
async fn test_start_without_factory_fails_closed() {
    let backend = LoopbackBackend::new();
    let server = Server::create(Arc::new(backend.clone()), &t01()).unwrap();

    let err = server.start().await.unwrap_err();
    match err {
        ServerError::ConnectionFailure(info) => assert_eq!(info.code, RfcRc::Closed),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!backend.calls().contains(&BackendCall::Launch(1)));

    // the server stays usable once a factory is supplied
    let factory = backend.connection_factory();
    server.add_connection_factory(move || factory());
    server.start().await.unwrap();
    assert!(backend.calls().contains(&BackendCall::Launch(1)));
}

#[tokio::test]
async fn test_launch_failure_can_be_retried() {
    let (server, backend) = server_with_loopback();
    backend.fail_next(
        BackendOp::Launch,
        RfcErrorInfo::new(RfcRc::CommunicationFailure, "gateway unreachable"),
    );

    let err = server.start().await.unwrap_err();
    assert_eq!(err.error_info().map(|e| e.code), Some(RfcRc::CommunicationFailure));
    server.start().await.unwrap();

    let launches = backend
        .calls()
        .into_iter()
        .filter(|c| matches!(c, BackendCall::Launch(_)))
        .count();
    assert_eq!(launches, 1);
}

#[tokio::test]
async fn test_dispose_releases_references_once_in_order() {
    let (server, backend) = server_with_loopback();
    let released = Arc::new(Mutex::new(Vec::new()));

    let refs = ["first", "second", "third"].map(|label| {
        let released = released.clone();
        on_dispose(label, move || released.lock().push(label))
    });
    server.add_references(refs);

    for _ in 0..3 {
        server.dispose().await.unwrap();
    }
    assert!(server.is_disposed());
    assert_eq!(*released.lock(), vec!["first", "second", "third"]);

    let destroys = backend
        .calls()
        .into_iter()
        .filter(|c| matches!(c, BackendCall::Destroy(_)))
        .count();
    assert_eq!(destroys, 1);
}

#[tokio::test]
async fn test_reference_added_after_dispose_is_released_immediately() {
    let (server, _backend) = server_with_loopback();
    server.dispose().await.unwrap();

    let released = Arc::new(Mutex::new(false));
    let flag = released.clone();
    server.add_references([on_dispose("late", move || *flag.lock() = true)]);
    assert!(*released.lock());
}

#[tokio::test]
async fn test_start_after_dispose_does_not_touch_factory() {
    let (server, backend) = server_with_loopback();
    server.dispose().await.unwrap();
    backend.clear_calls();

    assert!(matches!(server.start().await, Err(ServerError::InvalidHandle)));
    assert!(matches!(server.stop(0).await, Err(ServerError::InvalidHandle)));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_destroy_failure_still_releases_references() {
    let (server, backend) = server_with_loopback();
    server
        .add_function_handler(FunctionDescriptor::new("Z_PING"), noop)
        .unwrap();
    backend.fail_next(BackendOp::Destroy, RfcErrorInfo::new(RfcRc::InvalidHandle, "stale"));

    server.dispose().await.unwrap();
    assert!(!backend.is_function_installed(&SystemId::new("T01"), &FunctionName::new("Z_PING")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_reach_destroyed_handle() {
    let (server, backend) = server_with_loopback();
    let server = Arc::new(server);

    let mut tasks = Vec::new();
    for i in 0..32u32 {
        let server = server.clone();
        tasks.push(tokio::spawn(async move {
            match i % 4 {
                1 => server.stop(i).await,
                2 if i == 18 => server.dispose().await,
                _ => server.start().await,
            }
        }));
    }
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) | Err(ServerError::InvalidHandle) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let calls = backend.calls();
    let destroy_at = calls
        .iter()
        .position(|c| matches!(c, BackendCall::Destroy(_)))
        .expect("server was destroyed");
    assert!(calls[destroy_at + 1..]
        .iter()
        .all(|c| !matches!(c, BackendCall::Launch(_) | BackendCall::Shutdown(..))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispose_waits_for_release() {
    let (server, backend) = server_with_loopback();
    let server = Arc::new(server);
    let released = Arc::new(AtomicBool::new(false));
    let flag = released.clone();
    server.add_references([on_dispose("slow release", move || {
        std::thread::sleep(Duration::from_millis(200));
        flag.store(true, Ordering::SeqCst);
    })]);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let server = server.clone();
        let released = released.clone();
        tasks.push(tokio::spawn(async move {
            server.dispose().await.unwrap();
            // no caller may observe success before the release has run
            assert!(released.load(Ordering::SeqCst));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let destroys = backend
        .calls()
        .iter()
        .filter(|c| matches!(c, BackendCall::Destroy(_)))
        .count();
    assert_eq!(destroys, 1);
}

#[tokio::test]
async fn test_cancelled_start_still_launches() {
    let (server, backend) = server_with_loopback();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = server.start_with_cancel(&cancel).await;
    assert!(matches!(outcome, Err(ServerError::Cancelled)));

    // replies are FIFO, so the abandoned launch has run by now
    server.stop(0).await.unwrap();
    assert!(backend.calls().contains(&BackendCall::Launch(1)));
}

#[test]
fn test_dropping_server_outside_runtime_disposes() {
    let (server, backend) = server_with_loopback();
    server
        .add_function_handler(FunctionDescriptor::new("Z_PING"), noop)
        .unwrap();
    drop(server);

    let calls = backend.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        &[
            BackendCall::Destroy(1),
            BackendCall::ReleaseFunction("T01".into(), "Z_PING".into()),
        ]
    );
}
