//! Log output setup.
//!
//! Logs go to stderr so build summaries on stdout stay clean. `RUST_LOG`
//! overrides the level picked from `--verbose`.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "assetflow=debug,tower_http=debug"
    } else {
        "assetflow=info"
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_writer(std::io::stderr)
        .try_init();
}
