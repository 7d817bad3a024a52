// Local crates
use crate::helpers::shutdown::Shutdown;

// External crates
use tokio::task::JoinHandle;

/// Wait for a termination signal and return its name.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Route termination signals into `shutdown`.
///
/// If handlers cannot be installed the process keeps running; it can still be
/// stopped through the stop command or by being killed.
pub fn spawn_signal_listener(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => {
                tracing::info!(signal = name, "Termination signal received");
                shutdown.trigger("signal");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to install signal handlers"),
        }
    })
}
