//! Work units handed from the planner to workers.

use crate::count::CountChunk;
use crate::error::{PlanError, PlanResult};
use crate::range::ScanSplit;
use serde::{Deserialize, Serialize};

/// One independent unit of worker-side work.
///
/// `index` is the unit's position in the planned sequence and doubles as the
/// task number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkUnit {
    /// Key-range scan of one partition.
    Range {
        /// Task number.
        index: usize,
        /// Key range to scan.
        split: ScanSplit,
    },
    /// Positional page of a result set.
    Positional {
        /// Task number.
        index: usize,
        /// Record page to read.
        chunk: CountChunk,
    },
}

impl WorkUnit {
    /// Numbers a sequence of scan splits.
    pub fn ranges(splits: Vec<ScanSplit>) -> Vec<Self> {
        splits
            .into_iter()
            .enumerate()
            .map(|(index, split)| Self::Range { index, split })
            .collect()
    }

    /// Numbers a sequence of count chunks.
    pub fn positional(chunks: Vec<CountChunk>) -> Vec<Self> {
        chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| Self::Positional { index, chunk })
            .collect()
    }

    /// Task number.
    pub fn index(&self) -> usize {
        match self {
            Self::Range { index, .. } | Self::Positional { index, .. } => *index,
        }
    }

    /// Encodes to CBOR.
    pub fn to_cbor(&self) -> PlanResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| PlanError::Codec(format!("failed to encode work unit: {e}")))?;
        Ok(buf)
    }

    /// Decodes from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> PlanResult<Self> {
        ciborium::from_reader(bytes)
            .map_err(|e| PlanError::Codec(format!("failed to decode work unit: {e}")))
    }
}
