//! Tracing subscriber bootstrap.

use std::env;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "WIRE_TAPE_LOG";
pub const DEFAULT_FILTER: &str = "info";

/// Resolves the filter directive: explicit argument, then `WIRE_TAPE_LOG`,
/// then `RUST_LOG`, then `info`.
pub fn resolve_filter(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| non_empty_var(LOG_ENV))
        .or_else(|| non_empty_var("RUST_LOG"))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Installs a stderr fmt subscriber. Returns false when a global subscriber
/// was already installed.
pub fn init_logging(filter: Option<&str>) -> bool {
    let directive = resolve_filter(filter);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|error| {
        eprintln!("invalid log filter {directive:?}: {error}; using {DEFAULT_FILTER}");
        EnvFilter::new(DEFAULT_FILTER)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
        .is_ok()
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
