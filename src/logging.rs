//! Tracing subscriber setup.
//!
//! Log lines are handed to a background writer thread so access logging
//! never blocks a poller or worker on stdout.

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Target of the one-line-per-request access log.
pub const ACCESS_TARGET: &str = "access";

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
///
/// The returned guard flushes pending lines when dropped; keep it alive for
/// the lifetime of the process.
pub fn init() -> anyhow::Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_writer(writer),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}
