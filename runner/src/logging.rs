//! Logging setup with `tracing-subscriber`.
//!
//! The level comes from `--log-level`, then the `QCFLOW_LOG` environment
//! variable (any `EnvFilter` directive), then defaults to `info`. Logs go to
//! stderr so stdout stays free for `read` output.

use crate::cli::LogLevel;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "QCFLOW_LOG";

fn directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

pub fn filter(cli_level: Option<LogLevel>) -> EnvFilter {
    match cli_level {
        Some(level) => EnvFilter::new(directive(level)),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// install the global subscriber, only call once at startup
pub fn init_logging(cli_level: Option<LogLevel>) {
    fmt()
        .with_env_filter(filter(cli_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
