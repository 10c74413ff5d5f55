//! Tracing setup.
//!
//! The terminal belongs to the UI, so logs go to a file through a
//! non-blocking writer. Keep the returned guard alive until exit or buffered
//! lines are lost.

use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install a file-backed subscriber writing to `config.file` inside `dir`.
pub fn init(config: &LoggingConfig, dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let path = dir.join(&config.file);
  let (log_dir, file_name) = match (path.parent(), path.file_name()) {
    (Some(parent), Some(name)) => (parent.to_path_buf(), name.to_owned()),
    _ => return Err(eyre!("Invalid log file path: {}", path.display())),
  };

  let appender = tracing_appender::rolling::never(log_dir, file_name);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.level))
    .map_err(|e| eyre!("Invalid log filter '{}': {}", config.level, e))?;

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}

/// Install a stderr subscriber for one-shot commands.
pub fn init_stderr(config: &LoggingConfig) {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.level))
    .unwrap_or_else(|_| EnvFilter::new("info"));

  // Ignore the error: a subscriber may already be installed
  let _ = tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr))
    .try_init();
}
