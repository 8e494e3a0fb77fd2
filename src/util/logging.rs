//! Logging setup for host layers.
//!
//! The library only emits `tracing` events; whoever embeds it decides where
//! they go. This helper installs the same terminal subscriber a CLI would.

use tracing_subscriber::EnvFilter;

/// Install a compact stderr subscriber filtered to this crate.
///
/// `RUST_LOG` wins over `verbose` when set. Calling this when a global
/// subscriber already exists is a no-op.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("apiscope=debug")
        } else {
            EnvFilter::new("apiscope=info")
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}
