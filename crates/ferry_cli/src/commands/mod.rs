//! CLI command implementations.

pub mod demo;
pub mod error;
pub mod job;
pub mod keys;
pub mod plan_count;
pub mod plan_range;
