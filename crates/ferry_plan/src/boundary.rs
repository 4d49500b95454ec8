//! Partition boundaries as reported by a sorted store.

use crate::key::{KeyBound, KeyInterval};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One region of a sorted store's keyspace, `[start, end)`.
///
/// A store reports its regions in ascending order, contiguous and disjoint,
/// with only the first start and the last end left open. Boundaries are read
/// once per job and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionBoundary {
    /// Region start (inclusive).
    pub start: KeyBound,
    /// Region end (exclusive).
    pub end: KeyBound,
}

impl PartitionBoundary {
    /// Creates a boundary from typed bounds.
    pub fn new(start: KeyBound, end: KeyBound) -> Self {
        Self { start, end }
    }

    /// Creates a boundary from raw store keys (empty means open-ended).
    pub fn from_raw(start: &[u8], end: &[u8]) -> Self {
        Self::new(KeyBound::from_raw(start), KeyBound::from_raw(end))
    }

    /// A single region spanning the whole keyspace.
    pub fn whole() -> Self {
        Self::new(KeyBound::Unbounded, KeyBound::Unbounded)
    }

    /// Builds the contiguous region list cut at `split_points`.
    ///
    /// `n` ascending split points yield `n + 1` regions, the first starting
    /// and the last ending unbounded.
    pub fn covering(split_points: &[Bytes]) -> Vec<Self> {
        let mut regions = Vec::with_capacity(split_points.len() + 1);
        let mut start = KeyBound::Unbounded;
        for point in split_points {
            let end = KeyBound::Bounded(point.clone());
            regions.push(Self::new(start, end.clone()));
            start = end;
        }
        regions.push(Self::new(start, KeyBound::Unbounded));
        regions
    }

    /// Returns true if `key` belongs to this region.
    pub fn contains(&self, key: &[u8]) -> bool {
        KeyInterval::new(self.start.clone(), self.end.clone())
            .map(|region| region.contains(key))
            .unwrap_or(false)
    }
}
