//! Partition-aligned scan planning over a sorted store.

use crate::boundary::PartitionBoundary;
use crate::error::PlanResult;
use crate::key::{KeyBound, KeyInterval};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Source of a table's partition boundaries.
///
/// Implemented by store connectors. Boundaries are queried fresh for every
/// plan because regions split and merge between jobs.
pub trait BoundarySource {
    /// Returns the table's regions in ascending key order.
    fn partition_boundaries(&self, table: &str) -> PlanResult<Vec<PartitionBoundary>>;
}

/// One worker's scan range, wholly inside a single store partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanSplit {
    start: KeyBound,
    end: KeyBound,
}

impl ScanSplit {
    fn new(start: KeyBound, end: KeyBound) -> Self {
        Self { start, end }
    }

    /// Start key (inclusive).
    pub fn start(&self) -> &KeyBound {
        &self.start
    }

    /// End key (exclusive).
    pub fn end(&self) -> &KeyBound {
        &self.end
    }

    /// Returns true if `key` falls inside this split.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.interval().contains(key)
    }

    /// The split as a key interval.
    pub fn interval(&self) -> KeyInterval {
        KeyInterval::clipped(self.start.clone(), self.end.clone())
    }
}

impl fmt::Display for ScanSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Splits a requested key interval along the store's partition boundaries.
///
/// The planner makes one linear pass over the boundaries and emits one split
/// per region that overlaps the request. Output follows region order, which
/// is stable for task numbering but says nothing about work balance.
#[derive(Debug, Default, Clone, Copy)]
pub struct RangePartitioner;

impl RangePartitioner {
    /// Creates a range partitioner.
    pub fn new() -> Self {
        Self
    }

    /// Computes the scan splits for `requested` over `boundaries`.
    ///
    /// An unbounded request reproduces the store's own partitioning. An empty
    /// boundary list yields no splits.
    pub fn split(
        &self,
        requested: &KeyInterval,
        boundaries: &[PartitionBoundary],
    ) -> Vec<ScanSplit> {
        let splits: Vec<ScanSplit> = boundaries
            .iter()
            .filter_map(|region| clip(requested, region))
            .collect();
        debug!(
            requested = %requested,
            regions = boundaries.len(),
            splits = splits.len(),
            "computed scan splits"
        );
        splits
    }

    /// Validates raw bounds, then splits.
    ///
    /// Fails with `InvalidRange` before any boundary is inspected when a
    /// bounded start sorts after a bounded end.
    pub fn split_bounds(
        &self,
        start: KeyBound,
        end: KeyBound,
        boundaries: &[PartitionBoundary],
    ) -> PlanResult<Vec<ScanSplit>> {
        let requested = KeyInterval::new(start, end)?;
        Ok(self.split(&requested, boundaries))
    }

    /// Queries `source` for the table's boundaries and splits against them.
    pub fn plan<S>(
        &self,
        source: &S,
        table: &str,
        requested: &KeyInterval,
    ) -> PlanResult<Vec<ScanSplit>>
    where
        S: BoundarySource + ?Sized,
    {
        let boundaries = source.partition_boundaries(table)?;
        let splits = self.split(requested, &boundaries);
        info!(table, "split scan job into {} tasks", splits.len());
        Ok(splits)
    }
}

/// Intersects one region with the request, or `None` if they are disjoint.
fn clip(requested: &KeyInterval, region: &PartitionBoundary) -> Option<ScanSplit> {
    // Open-ended last region starting past the requested end.
    if let (KeyBound::Unbounded, KeyBound::Bounded(end), KeyBound::Bounded(region_start)) =
        (&region.end, requested.end(), &region.start)
    {
        if end < region_start {
            return None;
        }
    }

    // Region ends at or before the requested start.
    if let (KeyBound::Bounded(region_end), KeyBound::Bounded(start)) =
        (&region.end, requested.start())
    {
        if start >= region_end {
            return None;
        }
    }

    // Requested end at or before the region start.
    if let (KeyBound::Bounded(end), KeyBound::Bounded(region_start)) =
        (requested.end(), &region.start)
    {
        if end <= region_start {
            return None;
        }
    }

    Some(ScanSplit::new(
        requested.start().max_start(&region.start),
        requested.end().min_end(&region.end),
    ))
}
