//! Tracing subscriber setup.
//!
//! The filter is taken from `QUERYDESK_LOG`, then `RUST_LOG`, then falls back
//! to `info` (`debug` in debug builds).

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "QUERYDESK_LOG";

fn default_level() -> &'static str {
    if cfg!(debug_assertions) { "debug" } else { "info" }
}

/// Build the env filter, preferring an explicit directive string.
pub fn build_env_filter(directives: Option<&str>) -> EnvFilter {
    if let Some(directives) = directives {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }

    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level()))
}

/// Install a fmt subscriber; returns false when one is already installed.
pub fn try_init(directives: Option<&str>) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(directives))
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Install a fmt subscriber using the environment filter.
pub fn init() {
    if !try_init(None) {
        tracing::debug!("Tracing subscriber already installed");
    }
}
