//! Shutdown signal handling.
//!
//! Resolves on SIGTERM or SIGINT on Unix and on Ctrl+C everywhere.

use tracing::{info, warn};

/// Wait for SIGTERM, SIGINT, or Ctrl+C.
///
/// A handler that fails to install is logged and never fires; the other
/// one still can.
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT (Ctrl+C)"),
        _ = terminate => info!("received SIGTERM"),
    }
}
