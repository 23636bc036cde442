//! Logging for stages and runners.
//!
//! This module provides:
//! - Log sinks (tracing-backed and collecting)
//! - Scoped loggers handed explicitly to every stage and runner
//! - Subscriber initialisation for binaries and tests

mod scoped;
mod sink;

pub use scoped::{LoggingManager, ScopedLogger};
pub use sink::{CollectingLogSink, LogLevel, LogRecord, LogSink, TracingLogSink};

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `info`, or `debug` when `verbose` is set, if `RUST_LOG` is
/// unset. Does nothing if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
