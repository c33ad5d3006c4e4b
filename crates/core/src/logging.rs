//! Logging bootstrap.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,lumen_renderer=debug,lumen_rhi=debug";

/// Initialize the global subscriber with the default filter.
///
/// `RUST_LOG` takes precedence when set.
pub fn init_logging() {
    init_logging_with(DEFAULT_FILTER);
}

/// Initialize the global subscriber, falling back to `default_filter` when
/// `RUST_LOG` is unset or invalid.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_logging_with(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();

    if installed.is_ok() {
        tracing::debug!("Logging initialized (default filter: {default_filter})");
    }
}
