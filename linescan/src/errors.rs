/// Error types for linescan.
///
/// Errors fall into three groups, all surfaced through [`ScanError`]:
///
/// 1. **Configuration errors** (unknown strategy, zero workers). Detected before
///    any worker exists; fatal to the run but not to the process.
/// 2. **Pattern errors**. The pattern is compiled once, before fan-out.
/// 3. **Source errors**. An I/O failure while reading lines fails the whole run.
///    There is no partial-success mode: either every line is counted exactly
///    once or the caller gets an error and no stats.
///
/// ```rust,ignore
/// match linescan::run("guarded-read", "TODO", &mut source, 4) {
///     Ok(stats) => // Print stats,
///     Err(ScanError::InvalidPattern(detail)) => // Report bad regex,
///     Err(e) => // Handle other errors
/// }
/// ```
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur while configuring or running a scan
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Invalid worker count: {0} (need at least one worker)")]
    InvalidWorkerCount(usize),
    #[error("Failed to read from source: {0}")]
    SourceReadFailure(#[source] io::Error),
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl ScanError {
    pub fn unknown_strategy(name: impl Into<String>) -> Self {
        Self::UnknownStrategy(name.into())
    }

    pub fn invalid_pattern(detail: impl Into<String>) -> Self {
        Self::InvalidPattern(detail.into())
    }

    pub fn source_read_failure(err: io::Error) -> Self {
        Self::SourceReadFailure(err)
    }

    pub fn worker_pool(msg: impl Into<String>) -> Self {
        Self::WorkerPool(msg.into())
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Maps an error from opening `path` to the most specific variant.
    pub fn from_open_error(err: io::Error, path: impl Into<PathBuf>) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::file_not_found(path),
            io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }

    /// True for errors raised before any worker was started.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownStrategy(_)
                | Self::InvalidPattern(_)
                | Self::InvalidWorkerCount(_)
                | Self::ConfigError(_)
        )
    }
}
