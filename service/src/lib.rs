//! Composition root for the ledger pipeline.
//!
//! Two binaries live here:
//!
//! - `ledger` wires the Postgres repository, the Redpanda event bus and the event
//!   dispatcher from environment configuration and runs until interrupted.
//! - `demo` runs the whole pipeline in memory and walks one account through its
//!   lifecycle.

pub mod config;

pub use config::{Config, ConfigError};

use tokio::sync::broadcast;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "ledger=info";

/// Install the global `fmt` subscriber, filtered by `RUST_LOG` or `default_filter`.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Tell every dispatcher worker to stop.
///
/// Returns `false`, after logging a warning, if no worker was still listening.
pub fn signal_shutdown(shutdown: &broadcast::Sender<()>) -> bool {
    if shutdown.send(()).is_err() {
        warn!("Dispatcher workers already stopped");
        return false;
    }
    true
}
