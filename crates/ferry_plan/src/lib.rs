//! # ferry plan
//!
//! Driver-side planning for ferry jobs.
//!
//! This crate provides:
//! - Typed key bounds (`Bounded` / `Unbounded`) and the binary key text format
//! - `RangePartitioner` for partition-aligned scan splits over a sorted store
//! - `CountPartitioner` for positional `(offset, length)` chunks
//! - `WorkUnit` and its CBOR encoding for shipping splits to workers
//! - `Value`, the decoded cell type shared by readers
//!
//! ## Key Invariants
//!
//! - Splits never overlap and cover exactly the requested range clipped to the store
//! - Chunks reconstruct `[0, count)` with no gap or overlap
//! - Planning is pure: identical inputs give identical output sequences
//!
//! This is a pure planning crate with no I/O operations. The store is
//! consulted only through the [`BoundarySource`] trait.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod boundary;
mod count;
mod error;
mod key;
mod range;
mod unit;
mod value;

pub use boundary::PartitionBoundary;
pub use count::{CountChunk, CountPartitioner};
pub use error::{PlanError, PlanResult};
pub use key::{escape_binary, unescape_binary, KeyBound, KeyInterval};
pub use range::{BoundarySource, RangePartitioner, ScanSplit};
pub use unit::WorkUnit;
pub use value::Value;
