//! Resilient master/slave sessions against a remote table.

use crate::config::RetryConfig;
use crate::ddl::DdlRunner;
use crate::error::{RemoteError, RemoteResult, SessionError, SessionResult};
use crate::partition::{PartitionLifecycle, PartitionSpec, TableCatalog};
use crate::retry::{AcquireState, CancelToken, RetryPolicy};
use ferry_plan::{CountChunk, CountPartitioner, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// One record streamed through a session.
pub type Record = Vec<Value>;

/// Whether a session reads from or writes to its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionMode {
    /// Read session.
    Download,
    /// Write session.
    Upload,
}

impl SessionMode {
    fn label(self) -> &'static str {
        match self {
            SessionMode::Download => "download",
            SessionMode::Upload => "upload",
        }
    }
}

/// How a handle came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Created fresh by the planner, shared with workers by id.
    Master,
    /// Recreated on a worker from a master's id.
    Slave,
}

/// What `acquire` should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireKind {
    /// Create a new session.
    CreateMaster,
    /// Look up an existing session by id.
    ResumeSlave {
        /// Id issued to the master.
        session_id: String,
    },
}

/// Project, table and optional partition a session addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableDescriptor {
    /// Remote project.
    pub project: String,
    /// Table name.
    pub table: String,
    /// Target partition, for partitioned tables.
    pub partition: Option<PartitionSpec>,
}

impl TableDescriptor {
    /// Describes an unpartitioned table.
    pub fn new(project: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            table: table.into(),
            partition: None,
        }
    }

    /// Addresses one partition.
    pub fn with_partition(mut self, partition: PartitionSpec) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Parses and sets the partition when `text` is non-blank.
    pub fn with_partition_text(self, text: Option<&str>) -> SessionResult<Self> {
        match text.map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => Ok(self.with_partition(PartitionSpec::parse(text)?)),
            None => Ok(self),
        }
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.table)?;
        if let Some(partition) = &self.partition {
            write!(f, "/{partition}")?;
        }
        Ok(())
    }
}

/// What the store reports for a created or looked-up session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Store-issued session id.
    pub id: String,
    /// Records visible to a download session.
    pub record_count: Option<u64>,
}

/// A fully acquired session.
///
/// Only [`ResilientSession`] builds handles, and only from a successful
/// remote answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    id: String,
    table: TableDescriptor,
    mode: SessionMode,
    role: SessionRole,
    record_count: Option<u64>,
}

impl SessionHandle {
    /// Store-issued id, shared with workers to resume the session.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Addressed table.
    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    /// Read or write.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Master or slave.
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Records visible to a download session.
    pub fn record_count(&self) -> Option<u64> {
        self.record_count
    }
}

/// Streams records out of a download session.
pub trait RecordReader: Send {
    /// Returns the next record, or `None` at the end of the page.
    fn read(&mut self) -> RemoteResult<Option<Record>>;
}

/// Streams records into one block of an upload session.
pub trait RecordWriter: Send {
    /// Buffers one record.
    fn write(&mut self, record: Record) -> RemoteResult<()>;

    /// Flushes the block. Records become visible on commit.
    fn close(&mut self) -> RemoteResult<()>;
}

/// Remote session RPCs of an analytical store.
///
/// Each call is a single blocking attempt; retrying is the caller's job.
pub trait SessionClient: Send + Sync {
    /// Creates a session and returns its id.
    fn create_session(&self, mode: SessionMode, table: &TableDescriptor)
        -> RemoteResult<SessionInfo>;

    /// Looks up an existing session by id.
    fn get_session(
        &self,
        mode: SessionMode,
        table: &TableDescriptor,
        session_id: &str,
    ) -> RemoteResult<SessionInfo>;

    /// Opens a reader over `count` records starting at `offset`.
    fn open_reader(
        &self,
        session_id: &str,
        offset: u64,
        count: u64,
        compressed: bool,
    ) -> RemoteResult<Box<dyn RecordReader>>;

    /// Opens a writer for one block of an upload session.
    fn open_writer(
        &self,
        session_id: &str,
        block_id: u64,
        compressed: bool,
    ) -> RemoteResult<Box<dyn RecordWriter>>;

    /// Makes the listed blocks visible.
    fn commit_upload(&self, session_id: &str, blocks: &[u64]) -> RemoteResult<()>;
}

/// A master download session plus its positional work split.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    /// Handle whose id workers resume.
    pub master: SessionHandle,
    /// One chunk per worker.
    pub chunks: Vec<CountChunk>,
}

/// Acquires and uses sessions with every RPC wrapped in a [`RetryPolicy`].
///
/// One instance belongs to one worker (or to the planner). It tracks the
/// acquisition state of its latest `acquire` call.
pub struct ResilientSession<C: SessionClient + ?Sized> {
    client: Arc<C>,
    policy: RetryPolicy,
    state: Mutex<AcquireState>,
}

impl<C: SessionClient + ?Sized> ResilientSession<C> {
    /// Creates a session wrapper.
    pub fn new(client: Arc<C>, retry: RetryConfig) -> Self {
        Self {
            client,
            policy: RetryPolicy::new(retry),
            state: Mutex::new(AcquireState::Idle),
        }
    }

    /// Attaches a cancel token to every retry loop.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.policy = self.policy.with_cancel(token);
        self
    }

    /// State of the latest acquisition.
    pub fn state(&self) -> AcquireState {
        *self.state.lock()
    }

    /// Creates a master session or resumes a slave by id.
    ///
    /// Either returns a complete handle or fails with
    /// `SessionUnavailable`/`Cancelled`.
    pub fn acquire(
        &self,
        kind: AcquireKind,
        mode: SessionMode,
        table: &TableDescriptor,
    ) -> SessionResult<SessionHandle> {
        *self.state.lock() = AcquireState::Attempting;

        let result = match &kind {
            AcquireKind::CreateMaster => self
                .policy
                .run(&format!("create {} session", mode.label()), || {
                    self.client.create_session(mode, table)
                })
                .map(|info| (info, SessionRole::Master)),
            AcquireKind::ResumeSlave { session_id } => self
                .policy
                .run(&format!("get {} session", mode.label()), || {
                    self.client.get_session(mode, table, session_id)
                })
                .map(|info| (info, SessionRole::Slave)),
        };

        match result {
            Ok((info, role)) => {
                *self.state.lock() = AcquireState::Acquired;
                debug!(session = %info.id, %table, ?role, ?mode, "session acquired");
                Ok(SessionHandle {
                    id: info.id,
                    table: table.clone(),
                    mode,
                    role,
                    record_count: info.record_count,
                })
            }
            Err(err) => {
                *self.state.lock() = AcquireState::Exhausted;
                Err(err)
            }
        }
    }

    /// Creates a master session.
    pub fn create_master(
        &self,
        mode: SessionMode,
        table: &TableDescriptor,
    ) -> SessionResult<SessionHandle> {
        self.acquire(AcquireKind::CreateMaster, mode, table)
    }

    /// Resumes a session from a master's id.
    pub fn resume_slave(
        &self,
        mode: SessionMode,
        table: &TableDescriptor,
        session_id: impl Into<String>,
    ) -> SessionResult<SessionHandle> {
        self.acquire(
            AcquireKind::ResumeSlave {
                session_id: session_id.into(),
            },
            mode,
            table,
        )
    }

    /// Creates a master download session and splits its records into
    /// `parallelism` chunks.
    pub fn plan_download(
        &self,
        table: &TableDescriptor,
        parallelism: usize,
    ) -> SessionResult<DownloadPlan> {
        let master = self.create_master(SessionMode::Download, table)?;
        let count = master.record_count.unwrap_or(0);
        let count = i64::try_from(count).map_err(|_| {
            ferry_plan::PlanError::invalid_argument(format!("record count {count} out of range"))
        })?;
        let chunks = CountPartitioner::new().split(count, parallelism)?;
        info!(%table, records = count, tasks = chunks.len(), "planned download");
        Ok(DownloadPlan { master, chunks })
    }

    /// Opens a reader over one chunk of a download session.
    pub fn open_reader(
        &self,
        handle: &SessionHandle,
        chunk: &CountChunk,
        compressed: bool,
    ) -> SessionResult<Box<dyn RecordReader>> {
        if handle.mode != SessionMode::Download {
            return Err(SessionError::Remote(RemoteError::InvalidDescriptor(format!(
                "session {} is not a download session",
                handle.id
            ))));
        }
        self.policy.run("open record reader", || {
            self.client
                .open_reader(&handle.id, chunk.offset, chunk.length, compressed)
        })
    }

    /// Reads one chunk to the end, handing records to `sink`.
    ///
    /// Zero-length chunks are skipped without a remote call. Returns the
    /// number of records read.
    pub fn read_chunk<F>(
        &self,
        handle: &SessionHandle,
        chunk: &CountChunk,
        compressed: bool,
        mut sink: F,
    ) -> SessionResult<u64>
    where
        F: FnMut(Record),
    {
        if chunk.is_empty() {
            return Ok(0);
        }
        let mut reader = self.open_reader(handle, chunk, compressed)?;
        let mut read = 0u64;
        while let Some(record) = reader.read()? {
            sink(record);
            read += 1;
        }
        debug!(session = %handle.id, offset = chunk.offset, read, "chunk drained");
        Ok(read)
    }

    /// Opens a writer for one block of an upload session.
    pub fn open_writer(
        &self,
        handle: &SessionHandle,
        block_id: u64,
        compressed: bool,
    ) -> SessionResult<Box<dyn RecordWriter>> {
        if handle.mode != SessionMode::Upload {
            return Err(SessionError::Remote(RemoteError::InvalidDescriptor(format!(
                "session {} is not an upload session",
                handle.id
            ))));
        }
        self.policy.run("open record writer", || {
            self.client.open_writer(&handle.id, block_id, compressed)
        })
    }

    /// Commits the written blocks of an upload session.
    pub fn commit(&self, handle: &SessionHandle, blocks: &[u64]) -> SessionResult<()> {
        self.policy.run("commit upload session", || {
            self.client.commit_upload(&handle.id, blocks)
        })
    }

    /// Prepares the target partition, then creates a master upload session.
    pub fn create_upload<K, R>(
        &self,
        lifecycle: &PartitionLifecycle<K, R>,
        table: &TableDescriptor,
        overwrite: bool,
    ) -> SessionResult<SessionHandle>
    where
        K: TableCatalog + ?Sized,
        R: DdlRunner + ?Sized,
    {
        lifecycle.prepare(table, overwrite)?;
        self.create_master(SessionMode::Upload, table)
    }
}
