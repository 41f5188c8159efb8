//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for the log level:
//! 1. `--log-level` flag
//! 2. `PIPESH_LOG` environment variable
//! 3. `warn`
//!
//! Logs go to stderr so stdout carries only pipeline output and ledger dumps.

use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub fn init_logging(cli_level: Option<LogLevel>) {
    let level = match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => std::env::var("PIPESH_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(Level::WARN),
    };

    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
