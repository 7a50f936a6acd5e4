use std::fs;
use std::path::PathBuf;

use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::errors::CliError;

pub const LOG_ENV: &str = "CHATBOX_LOG";

/// Routes tracing output to a daily log file; the terminal belongs to the UI.
///
/// The filter comes from `CHATBOX_LOG` when set, otherwise `info` (or `debug`
/// with `--debug`) for this crate only.
pub fn init_tracing(debug: bool) -> Result<PathBuf, CliError> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "chatbox.log");
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if debug { "chatbox=debug" } else { "chatbox=info" })
    });

    tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init()
        .map_err(|e| CliError::Generic(format!("Failed to initialize logging: {e}")))?;

    tracing::debug!(path = %log_dir.display(), "tracing initialized");
    Ok(log_dir)
}

fn log_dir() -> Result<PathBuf, CliError> {
    let base = dirs::data_local_dir().ok_or_else(|| {
        CliError::Generic("Could not resolve data directory for this OS.".to_string())
    })?;
    Ok(base.join("chatbox").join("logs"))
}
