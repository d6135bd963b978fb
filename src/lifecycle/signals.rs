//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGINT (Ctrl+C) and, on Unix, SIGTERM
//! - Translate the first one into [`ServerHandle::stop`]
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The listener is handed the server handle; there is no global state
//! - Repeated signals are harmless: `stop` is idempotent

use tokio::task::JoinHandle;

use crate::lifecycle::startup::ServerHandle;

/// Spawn a task that stops `handle` on the first termination signal. The task
/// also ends if the server stops for another reason.
pub fn install(handle: ServerHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = termination() => {
                tracing::info!("Shutdown signal received");
                handle.stop().await;
            }
            _ = handle.wait() => {}
        }
    })
}

async fn termination() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
