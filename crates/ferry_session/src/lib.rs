//! # ferry session
//!
//! Worker-side session handling against a remote analytical store.
//!
//! This crate provides:
//! - `RetryPolicy`, the single bounded-retry wrapper for every session RPC
//! - `ResilientSession` (create a master session, resume a slave by id)
//! - Positional reads of planned `CountChunk`s through a session
//! - Partition lifecycle checks run before any upload session is opened
//! - DDL submission with polling to a terminal job status
//! - `MemoryWarehouse`, an in-memory store for tests and dry runs
//!
//! ## Key Invariants
//!
//! - Acquisition is all-or-nothing: a caller never sees a half-built handle
//! - Non-retryable errors end acquisition at once
//! - A worker owns its session handle; handles are never shared concurrently
//! - "Already exists" races during partition preparation count as success

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod ddl;
mod error;
mod memory;
mod partition;
mod retry;
mod session;

pub use config::{RetryConfig, SessionConfig, WriterConfig};
pub use ddl::{DdlExecutor, DdlRunner, DdlStatement, JobStatus};
pub use error::{RemoteError, RemoteResult, SessionError, SessionResult};
pub use memory::{MemoryWarehouse, WarehouseOp};
pub use partition::{PartitionLifecycle, PartitionSpec, TableCatalog};
pub use retry::{AcquireState, CancelToken, RetryPolicy};
pub use session::{
    AcquireKind, DownloadPlan, Record, RecordReader, RecordWriter, ResilientSession,
    SessionClient, SessionHandle, SessionInfo, SessionMode, SessionRole, TableDescriptor,
};
