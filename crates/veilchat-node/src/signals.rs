//! Shutdown signal handling.

/// Completes when the process receives SIGINT (Ctrl+C) or, on Unix,
/// SIGTERM.
///
/// # Errors
///
/// Returns an `io::Error` if a signal handler cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C");
            result
        }
        _ = term.recv() => {
            tracing::info!("received SIGTERM");
            Ok(())
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    let result = tokio::signal::ctrl_c().await;
    tracing::info!("received Ctrl+C");
    result
}
