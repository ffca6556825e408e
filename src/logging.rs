//! Diagnostic logging to stderr.
//!
//! The filter comes from `STAMP_LOG` (`RUST_LOG` syntax). Without it the
//! default is `warn`, or `stamp=debug` with `--verbose`. Reports always go
//! to stdout, so logs never mix with `--format json` output.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "STAMP_LOG";

/// Filter directive used when `STAMP_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "stamp=debug" } else { "warn" }
}

/// Initialize the global subscriber. Safe to call once per process.
pub fn init(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
