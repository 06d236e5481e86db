//! `tracing`-based logging setup for the demo binary. The library
//! itself only ever emits `tracing` events; only a binary embedding it
//! decides where those events go.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber for the demo binary.
///
/// `verbose` raises the default level past `info` (one step per
/// count, capped at `trace`); `quiet` lowers it to `warn`. Both are
/// overridden by `RUST_LOG` when set. Returns an error if a
/// subscriber is already installed.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let default_level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
}

static TEST_LOGGING: Once = Once::new();

/// Install a best-effort subscriber for test binaries. Safe to call
/// from every test; only the first call takes effect.
pub fn init_test_logging() {
    TEST_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("warn"))
            .with_test_writer()
            .try_init();
    });
}
