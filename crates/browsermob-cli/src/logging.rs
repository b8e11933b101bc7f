//! Logging init for the binaries.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,browsermob_proxy=debug";

/// Install a stderr subscriber. `RUST_LOG` overrides the default filter;
/// `verbose` raises everything to debug when `RUST_LOG` is unset.
pub fn init(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,hyper=info,reqwest=info")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
