//! Shutdown signal wiring (grounded on the teacher's
//! `operational::shutdown` signal installer): resolves as soon as either a
//! SIGTERM or Ctrl-C arrives, whichever the deployment sends.

use tracing::info;

/// Waits for SIGTERM (containers, systemd) or Ctrl-C (interactive use).
pub async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c, starting graceful shutdown"),
        () = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
}
