//! HTTP server for the attempt gate.
//!
//! # Endpoints
//!
//! - `GET  /health`                — Liveness probe
//! - `POST /api/whitelist/start`   — Start or resume an attempt
//! - `GET  /api/whitelist/status`  — Cooldown and attempt time left
//! - `POST /api/whitelist/finish`  — Close the attempt, open a cooldown
//! - `GET  /api/auth/user`         — Identity behind the session
//! - `POST /api/auth/logout`       — End the session

pub mod error;
pub mod routes;

pub use routes::{app_router, AppState};

use tokio::signal;

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
