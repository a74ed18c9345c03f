//! Diagnostic logging setup shared by all binaries.
//!
//! Operator-facing progress goes to stdout with `println!`; this only wires
//! up `tracing` output on stderr.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "IMAGE_PIPELINE_LOG";

/// Install the global fmt subscriber. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
