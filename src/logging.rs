//! Tracing setup shared by the command-line tools.
//!
//! Log lines always go to stderr so stdout stays clean for reports. When a log
//! directory is requested, a timestamped file is added there as well and only
//! the newest files are kept.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "segmetrics";

static LOG_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Where log output is written besides stderr.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogFile {
    /// Only stderr.
    #[default]
    Disabled,
    /// A new file in the application log directory.
    AppDir,
    /// A new file in the given directory.
    Dir(PathBuf),
}

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The application log directory could not be prepared.
    #[error("Failed to prepare log directory: {0}")]
    AppDir(#[from] app_dirs::AppDirError),
    /// Failed to create or access a custom log directory.
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to enumerate existing log files for pruning.
    #[error("Failed to read log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to remove an obsolete log file.
    #[error("Failed to remove old log file {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to format a timestamp for the log filename.
    #[error("Failed to format log filename time: {0}")]
    FormatTime(time::error::Format),
    /// Failed to create the log file for this run.
    #[error("Failed to create log file at {path}: {source}")]
    CreateLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to set the global tracing subscriber.
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `default_filter`. Subsequent calls are no-ops.
pub fn init(default_filter: &str, log_file: LogFile) -> Result<(), LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let timer = build_timer();
    let stderr_layer = fmt::layer()
        .with_timer(timer.clone())
        .with_writer(std::io::stderr);

    let (file_layer, guard, log_path) = match resolve_log_dir(log_file)? {
        Some(dir) => {
            let file_name = format_log_file_name(now_local_or_utc())?;
            let path = dir.join(&file_name);
            ensure_file_exists(&path)?;
            prune_old_logs(&dir, MAX_LOG_FILES)?;
            let (writer, guard) = tracing_appender::non_blocking(rolling::never(&dir, file_name));
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(writer);
            (Some(layer), Some(guard), Some(path))
        }
        None => (None, None, None),
    };

    let subscriber = Registry::default()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = LOG_GUARD.set(guard);

    match log_path {
        Some(path) => tracing::debug!("Logging initialized; log file at {}", path.display()),
        None => tracing::debug!("Logging initialized"),
    }
    Ok(())
}

fn resolve_log_dir(log_file: LogFile) -> Result<Option<PathBuf>, LoggingError> {
    match log_file {
        LogFile::Disabled => Ok(None),
        LogFile::AppDir => Ok(Some(app_dirs::logs_dir()?)),
        LogFile::Dir(path) => {
            fs::create_dir_all(&path).map_err(|source| LoggingError::CreateDir {
                path: path.clone(),
                source,
            })?;
            Ok(Some(path))
        }
    }
}

fn ensure_file_exists(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| LoggingError::CreateLogFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Delete the oldest `.log` files in `dir` until at most `max_files` remain.
fn prune_old_logs(dir: &Path, max_files: usize) -> Result<(), LoggingError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|source| LoggingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_file()))
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("log"))
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.path())
        })
        .collect::<Vec<_>>();

    // Newest first; everything past the limit goes.
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in entries.into_iter().skip(max_files) {
        fs::remove_file(&path).map_err(|source| LoggingError::RemoveFile { path, source })?;
    }
    Ok(())
}

fn format_log_file_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let name = now.format(NAME_FORMAT).map_err(LoggingError::FormatTime)?;
    Ok(format!("{LOG_FILE_PREFIX}_{name}.log"))
}

fn build_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
