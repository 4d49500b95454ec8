//! Plan-range command implementation.

use super::error::{CliError, CliResult};
use super::job::JobFile;
use ferry_plan::{
    escape_binary, BoundarySource, KeyBound, PartitionBoundary, PlanResult, RangePartitioner,
    WorkUnit,
};
use serde::Serialize;

/// One planned split as printed.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SplitRow {
    /// Task number.
    pub index: usize,
    /// Start key in binary key text; empty when unbounded.
    pub start: String,
    /// End key in binary key text; empty when unbounded.
    pub end: String,
    /// Encoded work unit size in bytes.
    pub payload_bytes: usize,
}

/// Boundaries given up front instead of queried from a store.
struct ConfiguredRegions(Vec<PartitionBoundary>);

impl BoundarySource for ConfiguredRegions {
    fn partition_boundaries(&self, _table: &str) -> PlanResult<Vec<PartitionBoundary>> {
        Ok(self.0.clone())
    }
}

fn key_text(bound: &KeyBound) -> String {
    bound.as_bytes().map(escape_binary).unwrap_or_default()
}

/// Computes the splits for a range job.
pub fn plan(job: &JobFile) -> CliResult<Vec<SplitRow>> {
    let table = job.table.as_deref().ok_or(CliError::Missing("table"))?;
    let requested = job.interval()?;
    let regions = ConfiguredRegions(job.boundaries());

    let splits = RangePartitioner::new().plan(&regions, table, &requested)?;
    WorkUnit::ranges(splits)
        .into_iter()
        .map(|unit| -> CliResult<SplitRow> {
            let payload_bytes = unit.to_cbor()?.len();
            match unit {
                WorkUnit::Range { index, split } => Ok(SplitRow {
                    index,
                    start: key_text(split.start()),
                    end: key_text(split.end()),
                    payload_bytes,
                }),
                WorkUnit::Positional { index, .. } => Err(ferry_plan::PlanError::invalid_argument(
                    format!("unexpected positional unit {index}"),
                )
                .into()),
            }
        })
        .collect()
}

/// Runs the plan-range command.
pub fn run(job: &JobFile, format: &str) -> CliResult<()> {
    let rows = plan(job)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            println!(
                "table {}: {} split(s)",
                job.table.as_deref().unwrap_or_default(),
                rows.len()
            );
            for row in &rows {
                println!(
                    "  #{:<4} [{}, {})  {} bytes",
                    row.index,
                    display_key(&row.start),
                    display_key(&row.end),
                    row.payload_bytes
                );
            }
        }
    }

    Ok(())
}

fn display_key(text: &str) -> &str {
    if text.is_empty() {
        "<unbounded>"
    } else {
        text
    }
}
