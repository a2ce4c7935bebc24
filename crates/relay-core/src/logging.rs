//! Tracing subscriber setup.
//!
//! One call at process start; the level comes from settings with
//! `RUST_LOG` taking precedence when set.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `level` is a default filter directive (e.g. `"info"` or
/// `"relay_server=debug,info"`); `json` switches to newline-delimited
/// JSON output for log shippers.
pub fn init(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
