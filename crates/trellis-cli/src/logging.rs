//! Subscriber setup for the binary.

use crate::cli::LogLevel;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use trellis_config::LoggingConfig;

/// Filter directives: `RUST_LOG` wins, then `--verbose`/`--log-level`,
/// then the configured level.
pub fn filter(config: &LoggingConfig, level: Option<LogLevel>, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directive = match (verbose, level) {
        (true, _) => LevelFilter::DEBUG.to_string(),
        (false, Some(level)) => LevelFilter::from(level).to_string(),
        (false, None) => config.level.clone(),
    };
    EnvFilter::new(directive)
}

/// Install the global subscriber, writing to stderr so stdout stays JSON.
pub fn init(config: &LoggingConfig, level: Option<LogLevel>, verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(config, level, verbose))
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr)
        .init();
}
