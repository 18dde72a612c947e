//! Logging configuration and initialization for Fallcrate.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{FallcrateError, Result};

/// Targets capped at a fixed level whatever the configured one.
const QUIET_DIRECTIVES: &[&str] = &["sqlx=warn"];

/// Parse log level string to tracing Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the filter: `RUST_LOG`, then the configured level, then the
/// quiet directives.
fn build_filter(level: &str) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(parse_level(level).into());
    for directive in QUIET_DIRECTIVES {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Open the log file for appending, creating its directory if needed.
fn open_log_file(path: &str) -> Result<File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(File::options().create(true).append(true).open(path)?)
}

/// Initialize logging to stdout and the configured log file.
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let log_file = Arc::new(open_log_file(&config.file)?);
    let writer = std::io::stdout.and(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .with(build_filter(&config.level))
        .try_init()
        .map_err(|e| FallcrateError::Config(format!("logging already initialized: {e}")))
}

/// Initialize console-only logging.
///
/// Used when the log file cannot be opened. Does nothing if a global
/// subscriber is already installed.
pub fn init_console_only(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true),
        )
        .with(build_filter(level))
        .try_init();
}
