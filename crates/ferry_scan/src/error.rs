//! Error types for scan execution.

use ferry_plan::PlanError;
use thiserror::Error;

/// Result type for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that abort a single scan task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// The store failed to open or advance a scanner.
    #[error("store error on table {table}: {message}")]
    Store {
        /// Scanned table.
        table: String,
        /// Store diagnostic.
        message: String,
    },

    /// A cell could not be converted to its declared type.
    #[error("cannot decode column {column}: {message}")]
    ColumnDecode {
        /// Configured column name.
        column: String,
        /// What was wrong with the bytes or literal.
        message: String,
    },

    /// The column type name is unknown, or not allowed for constants.
    #[error("unsupported column type: {0}")]
    UnsupportedColumnType(String),

    /// The work unit could not be scanned.
    #[error("planning error: {0}")]
    Plan(#[from] PlanError),
}

impl ScanError {
    /// Creates a store error.
    pub fn store(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a column decode error.
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ColumnDecode {
            column: column.into(),
            message: message.into(),
        }
    }
}
