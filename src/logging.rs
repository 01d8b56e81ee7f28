//! Diagnostic logging setup for the CLI.

use std::env;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding an `EnvFilter` directive, e.g. `dirsort=debug`.
pub const LOG_ENV: &str = "DIRSORT_LOG";

/// Installs the global subscriber, writing to stderr so stdout stays clean
/// for reports.
///
/// `DIRSORT_LOG` wins when set. Otherwise only warnings are shown, `-v`
/// raises that to info and `-vv` to debug.
pub fn init_logger(verbosity: u8) {
    let filter = env::var(LOG_ENV).unwrap_or_else(|_| default_directive(verbosity).to_string());
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .compact(),
        )
        .with(filter_layer)
        .try_init();
}

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "dirsort=info,warn",
        _ => "dirsort=debug,info",
    }
}
