//! `tracing` subscriber bootstrap shared by all three binaries.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes process-wide structured logging at the given default level
/// (overridable via `RUST_LOG`). Safe to call more than once; later calls
/// are no-ops.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
