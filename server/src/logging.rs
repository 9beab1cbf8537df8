//! Structured logging initialization.
//!
//! The RUST_LOG environment variable takes precedence over the
//! configured verbosity.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize the logging subsystem.
///
/// With `verbose` the server reports readiness and per-connection
/// errors at info level; without it only warnings and errors are
/// emitted. `RUST_LOG`, when set, overrides both.
pub fn init(verbose: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
