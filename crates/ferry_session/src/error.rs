//! Error types for remote sessions.

use ferry_plan::PlanError;
use thiserror::Error;

/// Result type for a single remote call.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failure reported by one remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or service hiccup.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The call did not answer in time.
    #[error("remote call timed out")]
    Timeout,

    /// Credentials were rejected.
    #[error("authorization failed: {0}")]
    Unauthorized(String),

    /// Project, table or partition descriptor is malformed.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The object being created already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The object addressed does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The service refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Returns true if repeating the call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_) | RemoteError::Timeout)
    }
}

/// Errors surfaced by session acquisition, reads, writes and partition DDL.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A session RPC failed for good, either exhausted or non-retryable.
    #[error("{operation} unavailable after {attempts} attempt(s): {source}")]
    SessionUnavailable {
        /// The RPC that was attempted.
        operation: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// The last remote failure.
        #[source]
        source: RemoteError,
    },

    /// Partition DDL failed for a reason other than a benign race.
    #[error("partition conflict on table {table} ({partition}): {source}")]
    PartitionConflict {
        /// Target table.
        table: String,
        /// Target partition, or `-` for the whole table.
        partition: String,
        /// The remote failure.
        #[source]
        source: RemoteError,
    },

    /// A submitted DDL/SQL job finished in failure.
    #[error("remote task {task} failed: {diagnostic} [statement: {statement}]")]
    RemoteTaskFailure {
        /// Task name the job ran under.
        task: String,
        /// Statement text.
        statement: String,
        /// Diagnostic reported by the job, verbatim.
        diagnostic: String,
    },

    /// A DDL job was submitted but its status could not be read.
    #[error("status of remote task {task} unavailable: {source} [statement: {statement}]")]
    JobStatusUnavailable {
        /// Task name the job ran under.
        task: String,
        /// Statement text.
        statement: String,
        /// The failed poll.
        #[source]
        source: RemoteError,
    },

    /// Partition text is malformed or does not fit the table layout.
    #[error("invalid partition spec: {0}")]
    InvalidPartitionSpec(String),

    /// An unretried remote call failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Planning failed.
    #[error("planning error: {0}")]
    Plan(#[from] PlanError),

    /// Acquisition was cancelled.
    #[error("session acquisition cancelled")]
    Cancelled,
}

impl SessionError {
    /// Wraps the last remote failure of `operation`.
    pub fn unavailable(operation: impl Into<String>, attempts: u32, source: RemoteError) -> Self {
        Self::SessionUnavailable {
            operation: operation.into(),
            attempts,
            source,
        }
    }

    /// Returns the underlying remote failure, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            SessionError::SessionUnavailable { source, .. }
            | SessionError::PartitionConflict { source, .. }
            | SessionError::JobStatusUnavailable { source, .. } => Some(source),
            SessionError::Remote(e) => Some(e),
            _ => None,
        }
    }
}
