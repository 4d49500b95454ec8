//! CLI error type.

use ferry_plan::PlanError;
use ferry_scan::ScanError;
use ferry_session::SessionError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// The job file could not be read.
    #[error("cannot read job file {path}: {source}")]
    Io {
        /// Job file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The job file is not valid JSON for a job.
    #[error("invalid job file {path}: {source}")]
    Json {
        /// Job file path.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A required setting was given neither in the job file nor as a flag.
    #[error("missing {0}: set it in the job file or pass it as a flag")]
    Missing(&'static str),

    /// Output could not be rendered.
    #[error("cannot render output: {0}")]
    Render(#[from] serde_json::Error),

    /// Planning failed.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A scan failed.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// A worker thread panicked.
    #[error("worker {0} panicked")]
    Worker(usize),
}
