//! Logging configuration and initialization.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

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

/// Build the filter: `RUST_LOG` directives plus the configured level.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(parse_level(level).into())
}

/// Initialize the logging system with the given configuration.
///
/// Logs go to stdout. When `config.file` is set they are also appended to
/// that file, whose parent directory is created if needed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if config.file.is_empty() {
        init_console_only(&config.level);
        return Ok(());
    }

    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let log_file = Arc::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.file)?,
    );
    let writer = std::io::stdout.and(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false),
        )
        .with(build_filter(&config.level))
        .try_init()
        .map_err(|e| crate::RelayError::Config(format!("logging already initialized: {e}")))?;

    Ok(())
}

/// Initialize console-only logging (for development/testing).
pub fn init_console_only(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(true),
        )
        .with(build_filter(level))
        .try_init();
}
