//! Tracing initialisation for the `landwatch` binary.
//!
//! `landwatch` calls [`init_tracing`] before loading its configuration, with
//! the global `--json` flag and a level picked from `--verbose`. Log lines go
//! to stderr so a `simulate --json` report on stdout stays machine-readable.
//! Later calls are ignored; the global subscriber is set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested level; everything else logs at WARN.
const LANDWATCH_TARGETS: [&str; 3] = ["landwatch_core", "landwatch_state", "landwatch"];

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(LANDWATCH_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",").to_lowercase()
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines, one object per event.
/// * `level`: landwatch verbosity when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .json(),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .ok();
    }
}
