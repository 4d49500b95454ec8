//! Sorted store seam and an in-memory implementation.

use crate::error::{ScanError, ScanResult};
use bytes::Bytes;
use ferry_plan::{BoundarySource, KeyBound, PartitionBoundary, PlanError, PlanResult, ScanSplit};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Cells of a row keyed by `(family, qualifier)`.
pub type Cells = BTreeMap<(Bytes, Bytes), Bytes>;

/// One row (or, with a batch limit, one slice of a row) returned by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRow {
    key: Bytes,
    cells: Cells,
}

impl StoreRow {
    /// Creates a row with no cells.
    pub fn new(key: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            cells: Cells::new(),
        }
    }

    /// Adds a cell.
    pub fn with_cell(
        mut self,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        self.cells
            .insert((family.into(), qualifier.into()), value.into());
        self
    }

    /// Row key.
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    /// Value of one cell, if present.
    pub fn cell(&self, family: &[u8], qualifier: &[u8]) -> Option<&Bytes> {
        self.cells
            .iter()
            .find(|((f, q), _)| f.as_ref() == family && q.as_ref() == qualifier)
            .map(|(_, v)| v)
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Scanner tuning passed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Rows fetched per round trip.
    pub caching: usize,
    /// Maximum cells per returned row slice; `None` returns whole rows.
    pub batch: Option<usize>,
}

impl ScanOptions {
    /// Default rows per round trip.
    pub const DEFAULT_CACHING: usize = 100;

    /// Creates options with whole-row results.
    pub fn new(caching: usize) -> Self {
        Self {
            caching: caching.max(1),
            batch: None,
        }
    }

    /// Sets the batch limit. Zero or a negative value means unlimited.
    pub fn with_batch(mut self, batch: i64) -> Self {
        self.batch = usize::try_from(batch).ok().filter(|b| *b > 0);
        self
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CACHING)
    }
}

/// Cursor over the rows of one split.
pub trait RowScanner: Send {
    /// Returns the next row, or `None` once the split is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `ScanError::Store` if the store fails mid-scan.
    fn next_row(&mut self) -> ScanResult<Option<StoreRow>>;
}

/// A sorted key-value store that can scan a key range.
///
/// Every worker opens its own scanner; scanners are never shared.
pub trait RangeStore: Send + Sync {
    /// Opens a scanner over `split` of `table`.
    ///
    /// # Errors
    ///
    /// Returns `ScanError::Store` if the table is missing or the store is
    /// unreachable.
    fn scan(
        &self,
        table: &str,
        split: &ScanSplit,
        options: &ScanOptions,
    ) -> ScanResult<Box<dyn RowScanner>>;
}

#[derive(Default)]
struct MemoryTable {
    split_points: Vec<Bytes>,
    rows: BTreeMap<Bytes, Cells>,
}

type Tables = Arc<RwLock<HashMap<String, MemoryTable>>>;

/// An ordered in-memory store with fixed region split points.
///
/// Serves boundaries for planning and paged scans for workers.
#[derive(Clone, Default)]
pub struct MemoryRangeStore {
    tables: Tables,
    fetches: Arc<AtomicUsize>,
}

impl MemoryRangeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table whose regions start at `split_points`.
    pub fn create_table(&self, table: &str, split_points: Vec<Bytes>) {
        let mut split_points = split_points;
        split_points.retain(|p| !p.is_empty());
        split_points.sort();
        split_points.dedup();
        self.tables.write().insert(
            table.to_string(),
            MemoryTable {
                split_points,
                rows: BTreeMap::new(),
            },
        );
    }

    /// Writes a row, merging its cells into any existing row.
    pub fn put(&self, table: &str, row: StoreRow) -> ScanResult<()> {
        let mut tables = self.tables.write();
        let state = tables
            .get_mut(table)
            .ok_or_else(|| ScanError::store(table, "table not found"))?;
        state.rows.entry(row.key).or_default().extend(row.cells);
        Ok(())
    }

    /// Number of page fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl BoundarySource for MemoryRangeStore {
    fn partition_boundaries(&self, table: &str) -> PlanResult<Vec<PartitionBoundary>> {
        let tables = self.tables.read();
        let state = tables
            .get(table)
            .ok_or_else(|| PlanError::boundary_query(table, "table not found"))?;
        Ok(PartitionBoundary::covering(&state.split_points))
    }
}

impl RangeStore for MemoryRangeStore {
    fn scan(
        &self,
        table: &str,
        split: &ScanSplit,
        options: &ScanOptions,
    ) -> ScanResult<Box<dyn RowScanner>> {
        if !self.tables.read().contains_key(table) {
            return Err(ScanError::store(table, "table not found"));
        }
        Ok(Box::new(MemoryScanner {
            tables: Arc::clone(&self.tables),
            fetches: Arc::clone(&self.fetches),
            table: table.to_string(),
            start: split.start().clone(),
            end: split.end().clone(),
            resume_after: None,
            options: *options,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }
}

struct MemoryScanner {
    tables: Tables,
    fetches: Arc<AtomicUsize>,
    table: String,
    start: KeyBound,
    end: KeyBound,
    resume_after: Option<Bytes>,
    options: ScanOptions,
    buffer: VecDeque<StoreRow>,
    exhausted: bool,
}

impl MemoryScanner {
    fn fetch_page(&mut self) -> ScanResult<()> {
        let tables = self.tables.read();
        let state = tables
            .get(&self.table)
            .ok_or_else(|| ScanError::store(&self.table, "table dropped during scan"))?;
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let lower = match (&self.resume_after, self.start.as_bytes()) {
            (Some(last), _) => Bound::Excluded(last.as_ref()),
            (None, Some(start)) => Bound::Included(start),
            (None, None) => Bound::Unbounded,
        };
        let upper = match self.end.as_bytes() {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        if is_empty_range(lower, upper) {
            self.exhausted = true;
            return Ok(());
        }

        // Options may be built literally, bypassing the floor in `new`.
        let caching = self.options.caching.max(1);
        let page: Vec<(Bytes, Cells)> = state
            .rows
            .range::<[u8], _>((lower, upper))
            .take(caching)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        drop(tables);

        trace!(table = %self.table, rows = page.len(), "fetched scan page");
        if page.len() < caching {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            self.resume_after = Some(last.clone());
        }
        for (key, cells) in page {
            self.push_row(key, cells);
        }
        Ok(())
    }

    fn push_row(&mut self, key: Bytes, cells: Cells) {
        let Some(batch) = self.options.batch else {
            self.buffer.push_back(StoreRow { key, cells });
            return;
        };
        let mut slice = Cells::new();
        for (column, value) in cells {
            slice.insert(column, value);
            if slice.len() == batch {
                self.buffer.push_back(StoreRow {
                    key: key.clone(),
                    cells: std::mem::take(&mut slice),
                });
            }
        }
        if !slice.is_empty() {
            self.buffer.push_back(StoreRow { key, cells: slice });
        }
    }
}

impl RowScanner for MemoryScanner {
    fn next_row(&mut self) -> ScanResult<Option<StoreRow>> {
        while self.buffer.is_empty() && !self.exhausted {
            self.fetch_page()?;
        }
        Ok(self.buffer.pop_front())
    }
}

fn is_empty_range(lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Excluded(u)) => l >= u,
        (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}
