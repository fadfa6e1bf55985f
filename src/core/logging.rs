//! Tracing subscriber setup
//!
//! `WINGMAN_LOG` takes precedence over the configured level and accepts full
//! `EnvFilter` directives (e.g. `wingman::tools=debug`).

use tracing_subscriber::EnvFilter;

use crate::core::config::LoggingConfig;

/// Environment variable holding filter directives
pub const LOG_ENV: &str = "WINGMAN_LOG";

/// Build the filter from the environment, falling back to the configured level
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(config: &LoggingConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(config))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
