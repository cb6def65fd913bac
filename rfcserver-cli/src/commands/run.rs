//! Run command implementation.

use anyhow::{Context, Result};
use rfcserver_core::{
    ConnectionHandle, FunctionDescriptor, LoopbackBackend, RfcErrorInfo, Server, ServerConfig,
    ServerError, TransactionHandler, TransactionId, TransactionPhaseResult,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Transaction handler that accepts every phase and logs it
struct LoggingTransactions;

impl TransactionHandler for LoggingTransactions {
    fn on_check(&self, connection: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult {
        info!(%connection, %tid, "transaction check");
        Ok(())
    }

    fn on_commit(&self, connection: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult {
        info!(%connection, %tid, "transaction commit");
        Ok(())
    }

    fn on_rollback(&self, connection: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult {
        info!(%connection, %tid, "transaction rollback");
        Ok(())
    }

    fn on_confirm(&self, connection: ConnectionHandle, tid: &TransactionId) -> TransactionPhaseResult {
        info!(%connection, %tid, "transaction confirm");
        Ok(())
    }
}

fn log_call(connection: ConnectionHandle, function: &FunctionDescriptor) -> Result<(), RfcErrorInfo> {
    info!(%connection, function = %function.name, "function called");
    Ok(())
}

/// Serve the configured functions until Ctrl-C (or right away with `once`)
pub async fn run_server(config: ServerConfig, once: bool) -> Result<()> {
    let backend = LoopbackBackend::new();
    let server = Server::create(Arc::new(backend.clone()), &config.parameters)
        .context("Failed to create server")?;

    let factory = backend.connection_factory();
    server.add_connection_factory(move || factory());

    for name in &config.functions {
        server.add_function_handler(FunctionDescriptor::new(name.clone()), log_call)?;
    }
    server.add_transaction_handler(LoggingTransactions)?;

    let interrupt = CancellationToken::new();
    let watcher = {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        })
    };

    match server.start_with_cancel(&interrupt).await {
        Ok(()) => {
            println!(
                "✓ rfcserver {} running with {} function(s)",
                server.system_id(),
                config.functions.len()
            );
            if !once {
                interrupt.cancelled().await;
            }
            server
                .stop(config.stop_timeout_ms)
                .await
                .context("Failed to stop server")?;
        }
        Err(ServerError::Cancelled) => info!("interrupted while starting"),
        Err(err) => {
            watcher.abort();
            server.dispose().await?;
            return Err(err).context("Failed to start server");
        }
    }
    watcher.abort();

    server.dispose().await?;
    println!("✓ rfcserver {} stopped", server.system_id());
    Ok(())
}
