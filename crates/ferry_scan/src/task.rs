//! Execution of one planned work unit.

use crate::column::ColumnSpec;
use crate::decoder::RowDecoder;
use crate::error::ScanResult;
use crate::store::{RangeStore, ScanOptions};
use ferry_plan::{PlanError, ScanSplit, Value, WorkUnit};
use tracing::{debug, info};

/// A worker's scan executor.
///
/// Reusable across the splits assigned to one worker; the decoder cache
/// carries over between them.
#[derive(Debug)]
pub struct ScanTask {
    decoder: RowDecoder,
    options: ScanOptions,
}

impl ScanTask {
    /// Creates a task emitting `columns` with default scan options.
    pub fn new(columns: Vec<ColumnSpec>) -> ScanResult<Self> {
        Ok(Self {
            decoder: RowDecoder::new(columns)?,
            options: ScanOptions::default(),
        })
    }

    /// Sets the scanner options.
    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Scan options in use.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scans `split` of `table`, handing each decoded record to `sink`.
    ///
    /// Returns the number of records produced. Any failure aborts this task
    /// only.
    pub fn run<S, F>(
        &mut self,
        store: &S,
        table: &str,
        split: &ScanSplit,
        mut sink: F,
    ) -> ScanResult<u64>
    where
        S: RangeStore + ?Sized,
        F: FnMut(Vec<Value>),
    {
        debug!(table, split = %split, "opening scanner");
        let mut scanner = store.scan(table, split, &self.options)?;

        let mut rows = 0u64;
        while let Some(row) = scanner.next_row()? {
            sink(self.decoder.decode(&row)?);
            rows += 1;
        }
        info!(table, split = %split, rows, "scan split finished");
        Ok(rows)
    }

    /// Runs a range work unit. Positional units belong to session readers.
    pub fn run_unit<S, F>(
        &mut self,
        store: &S,
        table: &str,
        unit: &WorkUnit,
        sink: F,
    ) -> ScanResult<u64>
    where
        S: RangeStore + ?Sized,
        F: FnMut(Vec<Value>),
    {
        match unit {
            WorkUnit::Range { split, .. } => self.run(store, table, split, sink),
            WorkUnit::Positional { index, .. } => Err(PlanError::invalid_argument(format!(
                "work unit {index} is positional and cannot be scanned by key"
            ))
            .into()),
        }
    }
}
