// src/logging.rs

//! Logging setup for `jobgraph` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. the level passed by the embedding application (usually `[logging].level`)
//! 2. `JOBGRAPH_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR.

use anyhow::{Result, anyhow};
use tracing_subscriber::fmt;

use crate::types::LogLevel;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup. A second call returns an error instead of
/// panicking.
pub fn init_logging(level: Option<LogLevel>) -> Result<()> {
    let level = match level {
        Some(lvl) => level_from_log_level(lvl),
        None => std::env::var("JOBGRAPH_LOG")
            .ok()
            .and_then(|s| s.parse::<LogLevel>().ok())
            .map(level_from_log_level)
            .unwrap_or(tracing::Level::INFO),
    };

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}
