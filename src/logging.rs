//! Log output for the binary: stderr plus an appended log file.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, warn};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

use crate::paths;

pub const LOG_FILE_NAME: &str = "pnr-scraper.log";

const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug`
/// with `verbose`. If the log file cannot be opened, logs go to stderr only.
pub fn init(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let log_path = paths::get_logs_dir().join(LOG_FILE_NAME);
    let (writer, file_error) = match open_log_file(&log_path) {
        Ok(file) => (BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file))), None),
        Err(e) => (BoxMakeWriter::new(std::io::stderr), Some(e)),
    };

    fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))?;

    if let Some(e) = file_error {
        warn!("Logging to stderr only: {:#}", e);
    }
    install_panic_hook();
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Routes panics through the logger so they also land in the log file.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        error!("PANIC: {}{}", msg, location);
        default_hook(panic_info);
    }));
}
