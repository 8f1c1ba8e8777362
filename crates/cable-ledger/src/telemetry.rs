//! Logging setup for binaries embedding the ledger.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info,cable_ledger=debug";

/// Install a global `tracing` subscriber: `RUST_LOG` filtering plus a fmt layer.
///
/// Calling it again, or after another subscriber was installed, is a no-op.
pub fn init_tracing() {
    let installed = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if installed.is_ok() {
        tracing::debug!("Tracing initialized");
    }
}
