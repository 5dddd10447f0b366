// src/logging.rs

//! Logging setup for `streamdag` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from `--log-level`, then the `STREAMDAG_LOG` environment
//! variable, then defaults to `info`. `STREAMDAG_LOG` accepts full filter
//! directives, e.g. `info,streamdag::stream=trace`.
//!
//! Logs go to stderr; stdout carries the replay report.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "STREAMDAG_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(cli_level))
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>) -> EnvFilter {
    match cli_level {
        Some(level) => EnvFilter::new(directive(level)),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

fn directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_levels_map_to_directives() {
        assert_eq!(directive(LogLevel::Error), "error");
        assert_eq!(directive(LogLevel::Debug), "debug");
        assert_eq!(directive(LogLevel::Trace), "trace");
    }
}
