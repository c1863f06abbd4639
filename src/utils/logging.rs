//! Structured logging setup.
//!
//! The crate itself only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_logging`] once; `RUST_LOG` overrides the configured
//! level.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Install a global subscriber built from `config`.
///
/// Fails if a global subscriber is already set or the log file cannot be opened.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();

    let mut layers = Vec::new();

    if config.log_to_console {
        if config.json_format {
            layers.push(fmt::layer().json().boxed());
        } else {
            layers.push(fmt::layer().with_target(true).boxed());
        }
    }

    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::ConfigError("log_file_path must be set to log to a file".into())
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open log file: {e}")))?;
        let writer = Mutex::new(file);

        if config.json_format {
            layers.push(fmt::layer().json().with_writer(writer).boxed());
        } else {
            layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}
