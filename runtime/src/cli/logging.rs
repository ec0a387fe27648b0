//! Tracing setup. Logs go to stderr so stdout carries only the JSON result.

use tracing_subscriber::EnvFilter;

/// Environment variable that replaces the default filter entirely.
pub const LOG_ENV: &str = "SCOUT_LOG";

/// Set to `json` for one JSON object per log line.
pub const LOG_FORMAT_ENV: &str = "SCOUT_LOG_FORMAT";

/// Filter used when `SCOUT_LOG` is unset or unparsable.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "scout_runtime=debug,scout=debug,warn"
    } else {
        "error"
    }
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case("json"))
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let format = std::env::var(LOG_FORMAT_ENV).ok();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = if wants_json(format.as_deref()) {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
