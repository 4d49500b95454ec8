//! Partition DDL statements and asynchronous job execution.

use crate::error::{RemoteError, RemoteResult, SessionError, SessionResult};
use crate::partition::PartitionSpec;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Status of a submitted DDL/SQL job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Still executing.
    Running,
    /// Finished successfully.
    Success,
    /// Finished in failure, with the service's diagnostic.
    Failed(String),
}

impl JobStatus {
    /// Returns true once the job has finished.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Submits textual statements as remote jobs.
pub trait DdlRunner: Send + Sync {
    /// Starts `statement` under `task_name` and returns the job id.
    fn submit(&self, statement: &str, task_name: &str) -> RemoteResult<String>;

    /// Reports the job's current status.
    fn poll(&self, job_id: &str) -> RemoteResult<JobStatus>;
}

/// A partition-management statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlStatement {
    /// Create a partition unless present.
    AddPartition {
        /// Target table.
        table: String,
        /// Partition to create.
        partition: PartitionSpec,
    },
    /// Drop a partition if present.
    DropPartition {
        /// Target table.
        table: String,
        /// Partition to drop.
        partition: PartitionSpec,
    },
    /// Remove every row of an unpartitioned table.
    Truncate {
        /// Target table.
        table: String,
    },
}

impl DdlStatement {
    /// Renders the statement text.
    pub fn to_sql(&self) -> String {
        match self {
            DdlStatement::AddPartition { table, partition } => format!(
                "alter table {table} add IF NOT EXISTS partition({});",
                partition.ddl_clause()
            ),
            DdlStatement::DropPartition { table, partition } => format!(
                "alter table {table} drop IF EXISTS partition({});",
                partition.ddl_clause()
            ),
            DdlStatement::Truncate { table } => format!("truncate table {table};"),
        }
    }

    /// Returns true if `err` from submitting this statement means the
    /// target is already in the requested state.
    ///
    /// Only "already exists" on add and "not found" on drop qualify;
    /// truncate tolerates nothing.
    pub fn tolerates(&self, err: &RemoteError) -> bool {
        match self {
            DdlStatement::AddPartition { .. } => matches!(err, RemoteError::AlreadyExists(_)),
            DdlStatement::DropPartition { .. } => matches!(err, RemoteError::NotFound(_)),
            DdlStatement::Truncate { .. } => false,
        }
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Runs statements through a [`DdlRunner`] and waits for a terminal status.
///
/// DDL is never retried here. A failed submit comes back as
/// `SessionError::Remote`, a failed poll as `JobStatusUnavailable` and a
/// failed job as `RemoteTaskFailure` with its diagnostic.
pub struct DdlExecutor<R: DdlRunner + ?Sized> {
    runner: Arc<R>,
    poll_interval: Duration,
}

impl<R: DdlRunner + ?Sized> DdlExecutor<R> {
    /// Creates an executor polling every second.
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs a statement to completion.
    pub fn run(&self, statement: &DdlStatement) -> SessionResult<()> {
        self.run_sql(&statement.to_sql())
    }

    /// Runs raw statement text to completion. Blank text is a no-op.
    pub fn run_sql(&self, sql: &str) -> SessionResult<()> {
        if sql.trim().is_empty() {
            return Ok(());
        }

        let task = format!("ferry_ddl_{}", Uuid::new_v4().to_string().replace('-', "_"));
        info!(task = %task, sql, "submitting ddl task");

        let job = self.runner.submit(sql, &task)?;
        loop {
            let status = self.runner.poll(&job).map_err(|source| {
                SessionError::JobStatusUnavailable {
                    task: task.clone(),
                    statement: sql.to_string(),
                    source,
                }
            })?;
            match status {
                JobStatus::Running => std::thread::sleep(self.poll_interval),
                JobStatus::Success => {
                    debug!(task = %task, job = %job, "ddl task succeeded");
                    return Ok(());
                }
                JobStatus::Failed(diagnostic) => {
                    return Err(SessionError::RemoteTaskFailure {
                        task,
                        statement: sql.to_string(),
                        diagnostic,
                    });
                }
            }
        }
    }
}
