//! Initialization helpers for the application startup.

use crate::config::Config;

/// Builds the filter directive string: the configured level, with the HTTP
/// stack silenced unless the level already mentions it.
fn filter_directives(config: &Config) -> String {
    let mut filter = config.logging.level.clone();

    // Suppress hyper/reqwest connection chatter unless explicitly enabled
    for noisy in ["hyper", "hyper_util", "reqwest"] {
        if !filter.contains(noisy) {
            filter.push_str(&format!(",{}=warn", noisy));
        }
    }
    filter
}

/// Sets up the tracing subscriber with the configured filters.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter_directives(config)));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
