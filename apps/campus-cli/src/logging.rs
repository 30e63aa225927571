//! Logging setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber.
///
/// `RUST_LOG` overrides the level chosen from the verbose flag.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
