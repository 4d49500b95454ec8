//! # ferry scan
//!
//! Worker-side execution of planned scan splits against a sorted store.
//!
//! This crate provides:
//! - `RangeStore` / `RowScanner`, the seam to a sorted key-value store
//! - `ColumnSpec` and typed cell conversion into `Value`
//! - `RowDecoder` with a worker-local `family:qualifier` cache
//! - `ScanTask`, which streams one split's decoded rows to a sink
//! - `MemoryRangeStore`, an ordered in-memory store with fixed regions
//!
//! ## Key Invariants
//!
//! - A scanner never yields a row outside its split
//! - Each worker owns its scanner and decoder; nothing is shared
//! - A failing split aborts only its own task

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod column;
mod decoder;
mod error;
mod store;
mod task;

pub use column::{ColumnSpec, ColumnType, DEFAULT_DATE_FORMAT, ROWKEY_COLUMN};
pub use decoder::RowDecoder;
pub use error::{ScanError, ScanResult};
pub use store::{Cells, MemoryRangeStore, RangeStore, RowScanner, ScanOptions, StoreRow};
pub use task::ScanTask;
