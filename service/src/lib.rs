//! # Tenant Registry Service
//!
//! Process wiring for the registry: environment [`config`], [`telemetry`]
//! initialisation and the [`bootstrap`] of the write path, read path and the
//! projection consumer.
//!
//! The HTTP transport is not part of this crate; an API process embeds
//! [`bootstrap::WritePath`] and [`bootstrap::read_path`] behind its routes.

pub mod bootstrap;
pub mod config;
pub mod telemetry;

pub use config::Config;

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed that signal is ignored and a warning is
/// logged; the other signal still works.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        }
    }
}
