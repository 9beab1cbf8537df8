//! Signal handling for graceful shutdown.
//!
//! Provides cross-platform handling of SIGINT and SIGTERM so the
//! server can close its listener and exit cleanly.

use tokio::sync::watch;

/// Install signal handlers for graceful shutdown.
///
/// Returns a channel that flips to `true` when a shutdown signal is
/// received. A second signal forces an immediate exit.
pub fn install_signal_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    ctrlc::set_handler(move || {
        if tx.send_replace(true) {
            tracing::warn!("received second signal, forcing immediate exit");
            std::process::exit(1);
        }
        tracing::info!("received shutdown signal, closing listener");
    })
    .expect("failed to install signal handler");

    rx
}
