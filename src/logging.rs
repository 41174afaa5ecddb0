//! Tracing setup for hosts embedding the stage.
//!
//! Logs go to stdout through a compact formatter and, when a writable target
//! exists, to a file as well. `DOCSTRUCT_LOG_FILE` names the file; without it
//! the stage appends to `logs/docstruct.log`. File output runs through a
//! non-blocking writer whose guard is held for the process lifetime.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global tracing subscriber: compact stdout plus an optional
/// file layer.
///
/// `RUST_LOG` controls filtering and defaults to `info`. Call once near
/// process start.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_target(false).compact();
    let base = tracing_subscriber::registry().with(filter).with(stdout);

    match file_writer() {
        Some(writer) => {
            let file = fmt::layer().with_writer(writer).with_ansi(false).compact();
            base.with(file).init();
        }
        None => base.init(),
    }
}

/// Where file logs land: the `DOCSTRUCT_LOG_FILE` override or the default
/// under `logs/`.
fn log_path() -> PathBuf {
    match std::env::var("DOCSTRUCT_LOG_FILE") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from("logs").join("docstruct.log"),
    }
}

/// Open the log file for appending behind a non-blocking writer.
///
/// Returns `None`, leaving only the stdout layer, when the directory or file
/// cannot be prepared.
fn file_writer() -> Option<NonBlocking> {
    let path = log_path();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(error) = std::fs::create_dir_all(parent)
    {
        eprintln!(
            "Failed to create log directory {}: {error}",
            parent.display()
        );
        return None;
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = FILE_GUARD.set(guard);
            Some(writer)
        }
        Err(error) => {
            eprintln!("Failed to open log file {}: {error}", path.display());
            None
        }
    }
}
