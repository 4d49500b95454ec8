//! Positional chunking of a fixed-size result set.

use crate::error::{PlanError, PlanResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A positional page `[offset, offset + length)` of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountChunk {
    /// First record index.
    pub offset: u64,
    /// Number of records.
    pub length: u64,
}

impl CountChunk {
    /// Creates a chunk.
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// One past the last record index.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Returns true for a zero-length chunk, which a worker can skip.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Splits `[0, count)` into near-equal contiguous chunks.
///
/// Used for stores that page by position instead of exposing key
/// boundaries. Chunk lengths differ by at most one; the longer chunks come
/// first.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountPartitioner;

impl CountPartitioner {
    /// Creates a count partitioner.
    pub fn new() -> Self {
        Self
    }

    /// Computes `parallelism` chunks covering `[0, count)`.
    ///
    /// `count == 0` yields the single chunk `(0, 0)`. When `parallelism`
    /// exceeds `count` the tail chunks have length zero but still carry a
    /// valid offset.
    pub fn split(&self, count: i64, parallelism: usize) -> PlanResult<Vec<CountChunk>> {
        if count < 0 {
            return Err(PlanError::invalid_argument(format!(
                "record count must not be negative, got {count}"
            )));
        }
        if parallelism < 1 {
            return Err(PlanError::invalid_argument(format!(
                "parallelism must be at least 1, got {parallelism}"
            )));
        }
        if count == 0 {
            return Ok(vec![CountChunk::new(0, 0)]);
        }

        let points = boundary_points(count as u64, parallelism as u64);
        let chunks: Vec<CountChunk> = points
            .windows(2)
            .map(|w| CountChunk::new(w[0], w[1] - w[0]))
            .collect();
        debug!(count, parallelism, chunks = chunks.len(), "computed count chunks");
        Ok(chunks)
    }
}

/// Returns `slices + 1` ascending cut points from `0` to `total`.
///
/// The first `total % slices` slices take one extra record.
fn boundary_points(total: u64, slices: u64) -> Vec<u64> {
    let step = total / slices;
    let remainder = total % slices;

    let mut points = Vec::with_capacity(slices as usize + 1);
    let mut cursor = 0u64;
    points.push(cursor);
    for i in 0..slices {
        cursor += step + u64::from(i < remainder);
        points.push(cursor);
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(chunks: &[CountChunk]) -> Vec<u64> {
        chunks.iter().map(|c| c.length).collect()
    }

    #[test]
    fn ten_records_three_ways() {
        let chunks = CountPartitioner::new().split(10, 3).unwrap();
        assert_eq!(
            chunks,
            vec![
                CountChunk::new(0, 4),
                CountChunk::new(4, 3),
                CountChunk::new(7, 3),
            ]
        );
    }

    #[test]
    fn zero_records_yield_one_empty_chunk() {
        let chunks = CountPartitioner::new().split(0, 8).unwrap();
        assert_eq!(chunks, vec![CountChunk::new(0, 0)]);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn parallelism_above_count_leaves_empty_tail() {
        let chunks = CountPartitioner::new().split(2, 5).unwrap();
        assert_eq!(lengths(&chunks), vec![1, 1, 0, 0, 0]);
        assert!(chunks[2..].iter().all(|c| c.offset == 2 && c.is_empty()));
    }

    #[test]
    fn single_slice_covers_everything() {
        let chunks = CountPartitioner::new().split(7, 1).unwrap();
        assert_eq!(chunks, vec![CountChunk::new(0, 7)]);
    }

    #[test]
    fn rejects_malformed_input() {
        let partitioner = CountPartitioner::new();
        assert!(matches!(
            partitioner.split(-1, 3),
            Err(PlanError::InvalidArgument(_))
        ));
        assert!(matches!(
            partitioner.split(10, 0),
            Err(PlanError::InvalidArgument(_))
        ));
    }

    #[test]
    fn chunk_end() {
        assert_eq!(CountChunk::new(4, 3).end(), 7);
    }
}
