//! Error types for planning.

use thiserror::Error;

/// Result type for planning operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors that can occur while planning work units.
///
/// Every variant is raised before any work is handed out, so a failed plan
/// never leaves a partial split set behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Requested key interval has `start > end`.
    #[error("invalid key range: start {start} is greater than end {end}")]
    InvalidRange {
        /// Start key in binary text form.
        start: String,
        /// End key in binary text form.
        end: String,
    },

    /// Malformed count or parallelism.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store could not report its partition boundaries.
    #[error("failed to query partition boundaries of {table}: {message}")]
    BoundaryQuery {
        /// Table that was queried.
        table: String,
        /// Error reported by the store.
        message: String,
    },

    /// Work unit encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl PlanError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a boundary query error.
    pub fn boundary_query(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BoundaryQuery {
            table: table.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PlanError::InvalidRange {
            start: "z".into(),
            end: "a".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid key range: start z is greater than end a"
        );

        let err = PlanError::boundary_query("orders", "region server down");
        assert!(err.to_string().contains("orders"));
        assert!(err.to_string().contains("region server down"));
    }
}
