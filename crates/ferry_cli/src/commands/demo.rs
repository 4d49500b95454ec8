//! Demo command implementation.
//!
//! Runs both planning modes end to end against the in-memory stores: a
//! region-aligned key scan, then a positional download through resilient
//! sessions and an upload into a prepared partition.

use super::error::{CliError, CliResult};
use super::job::JobFile;
use bytes::Bytes;
use ferry_plan::{RangePartitioner, Value, WorkUnit};
use ferry_scan::{ColumnSpec, ColumnType, MemoryRangeStore, ScanTask, StoreRow};
use ferry_session::{
    DdlExecutor, MemoryWarehouse, PartitionLifecycle, PartitionSpec, Record, RemoteError,
    ResilientSession, SessionConfig, SessionError, SessionMode, TableDescriptor, WarehouseOp,
};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

const SOURCE_PARTITION: &str = "pt=source";
const DEFAULT_TARGET_PARTITION: &str = "pt=copy";

/// Outcome of a demo run.
#[derive(Debug, Serialize)]
pub struct DemoReport {
    /// Splits planned for the key scan.
    pub range_splits: usize,
    /// Rows produced by all scan workers.
    pub scanned_rows: u64,
    /// Chunks planned for the positional download.
    pub chunks: usize,
    /// Rows read by all download workers.
    pub downloaded_rows: u64,
    /// Partition the upload went to.
    pub upload_target: String,
    /// Rows visible in the target after commit.
    pub uploaded_rows: usize,
}

fn row_key(i: usize) -> String {
    format!("row{i:06}")
}

/// Runs the demo and returns its report.
pub fn simulate(job: &JobFile, rows: usize, parallelism: usize) -> CliResult<DemoReport> {
    let (range_splits, scanned_rows) = scan_phase(job, rows)?;

    let config = job
        .session
        .clone()
        .unwrap_or_else(|| SessionConfig::new("demo"));
    let warehouse = Arc::new(MemoryWarehouse::new(config.project.clone()));
    warehouse.create_table("events", &["pt"]);
    let source_partition = PartitionSpec::parse(SOURCE_PARTITION)?;
    let records = (0..rows)
        .map(|i| vec![Value::Int(i as i64), Value::Text(row_key(i))])
        .collect();
    warehouse
        .insert_rows("events", Some(&source_partition), records)
        .map_err(SessionError::from)?;

    let (chunks, downloaded) = download_phase(&warehouse, &config, source_partition, parallelism)?;
    let downloaded_rows: u64 = downloaded.iter().map(|c| c.len() as u64).sum();

    let target_text = job
        .writer
        .partition
        .clone()
        .unwrap_or_else(|| DEFAULT_TARGET_PARTITION.to_string());
    let target = TableDescriptor::new(config.project.clone(), "events")
        .with_partition_text(Some(target_text.as_str()))?;
    upload_phase(&warehouse, &config, &target, job.writer.truncate, downloaded)?;
    let uploaded_rows = warehouse.rows("events", target.partition.as_ref()).len();

    Ok(DemoReport {
        range_splits,
        scanned_rows,
        chunks,
        downloaded_rows,
        upload_target: target.to_string(),
        uploaded_rows,
    })
}

fn scan_phase(job: &JobFile, rows: usize) -> CliResult<(usize, u64)> {
    let table = job.table.clone().unwrap_or_else(|| "demo".to_string());
    let store = Arc::new(MemoryRangeStore::new());

    let mut split_points = job.split_points();
    if split_points.is_empty() {
        split_points = (1..4)
            .map(|q| Bytes::from(row_key(q * rows / 4)))
            .collect();
    }
    store.create_table(&table, split_points);
    for i in 0..rows {
        store.put(
            &table,
            StoreRow::new(row_key(i))
                .with_cell("cf", "id", (i as i64).to_be_bytes().to_vec())
                .with_cell("cf", "name", format!("name-{i}")),
        )?;
    }

    let splits = RangePartitioner::new().plan(store.as_ref(), &table, &job.interval()?)?;
    let units = WorkUnit::ranges(splits);
    let planned = units.len();
    let options = job.scan_options();

    let workers: Vec<_> = units
        .into_iter()
        .map(|unit| {
            let store = Arc::clone(&store);
            let table = table.clone();
            thread::spawn(move || -> ferry_scan::ScanResult<u64> {
                let mut task = ScanTask::new(vec![
                    ColumnSpec::new("rowkey", ColumnType::String),
                    ColumnSpec::new("cf:id", ColumnType::Long),
                    ColumnSpec::new("cf:name", ColumnType::String),
                    ColumnSpec::new("origin", ColumnType::String).with_constant("demo"),
                ])?
                .with_options(options);
                task.run_unit(store.as_ref(), &table, &unit, |_| {})
            })
        })
        .collect();

    let mut scanned = 0;
    for (index, worker) in workers.into_iter().enumerate() {
        scanned += worker.join().map_err(|_| CliError::Worker(index))??;
    }
    info!(table = %table, splits = planned, rows = scanned, "scan phase finished");
    Ok((planned, scanned))
}

fn download_phase(
    warehouse: &Arc<MemoryWarehouse>,
    config: &SessionConfig,
    partition: PartitionSpec,
    parallelism: usize,
) -> CliResult<(usize, Vec<Vec<Record>>)> {
    let source = TableDescriptor::new(config.project.clone(), "events").with_partition(partition);

    // One flaky create so the retry path shows up in the logs.
    warehouse.fail_next(
        WarehouseOp::CreateSession,
        1,
        RemoteError::Transient("simulated tunnel outage".into()),
    );
    let planner = ResilientSession::new(Arc::clone(warehouse), config.retry.clone());
    let plan = planner.plan_download(&source, parallelism)?;

    let workers: Vec<_> = plan
        .chunks
        .iter()
        .copied()
        .map(|chunk| {
            let warehouse = Arc::clone(warehouse);
            let retry = config.retry.clone();
            let compress = config.compress;
            let source = source.clone();
            let master_id = plan.master.id().to_string();
            thread::spawn(move || -> Result<Vec<Record>, SessionError> {
                let worker = ResilientSession::new(warehouse, retry);
                let handle = worker.resume_slave(SessionMode::Download, &source, master_id)?;
                let mut records = Vec::new();
                worker.read_chunk(&handle, &chunk, compress, |r| records.push(r))?;
                Ok(records)
            })
        })
        .collect();

    let mut downloaded = Vec::with_capacity(workers.len());
    for (index, worker) in workers.into_iter().enumerate() {
        downloaded.push(worker.join().map_err(|_| CliError::Worker(index))??);
    }
    Ok((plan.chunks.len(), downloaded))
}

fn upload_phase(
    warehouse: &Arc<MemoryWarehouse>,
    config: &SessionConfig,
    target: &TableDescriptor,
    overwrite: bool,
    blocks: Vec<Vec<Record>>,
) -> CliResult<()> {
    let lifecycle = PartitionLifecycle::new(
        Arc::clone(warehouse),
        DdlExecutor::new(Arc::clone(warehouse)).with_poll_interval(Duration::from_millis(10)),
    );
    let session = ResilientSession::new(Arc::clone(warehouse), config.retry.clone());
    let master = session.create_upload(&lifecycle, target, overwrite)?;

    let mut written = Vec::with_capacity(blocks.len());
    for (block, records) in blocks.into_iter().enumerate() {
        let block = block as u64;
        let mut writer = session.open_writer(&master, block, config.compress)?;
        for record in records {
            writer.write(record).map_err(SessionError::from)?;
        }
        writer.close().map_err(SessionError::from)?;
        written.push(block);
    }
    session.commit(&master, &written)?;
    Ok(())
}

/// Runs the demo command.
pub fn run(job: &JobFile, rows: usize, parallelism: usize, format: &str) -> CliResult<()> {
    let report = simulate(job, rows, parallelism)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("scan:     {} split(s), {} row(s)", report.range_splits, report.scanned_rows);
            println!(
                "download: {} chunk(s), {} row(s)",
                report.chunks, report.downloaded_rows
            );
            println!(
                "upload:   {} row(s) into {}",
                report.uploaded_rows, report.upload_target
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_session::RetryConfig;

    fn fast_job() -> JobFile {
        JobFile {
            session: Some(
                SessionConfig::new("demo")
                    .with_retry(RetryConfig::new(3).with_interval(Duration::from_millis(1))),
            ),
            ..JobFile::default()
        }
    }

    #[test]
    fn every_row_makes_the_trip() {
        let report = simulate(&fast_job(), 100, 3).unwrap();
        assert_eq!(report.range_splits, 4);
        assert_eq!(report.scanned_rows, 100);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.downloaded_rows, 100);
        assert_eq!(report.uploaded_rows, 100);
        assert_eq!(report.upload_target, "demo.events/pt=copy");
    }

    #[test]
    fn key_range_limits_the_scan() {
        let job = JobFile {
            start_rowkey: row_key(10),
            end_rowkey: row_key(30),
            ..fast_job()
        };
        let report = simulate(&job, 100, 2).unwrap();
        assert_eq!(report.range_splits, 2);
        assert_eq!(report.scanned_rows, 20);
    }

    #[test]
    fn overwrite_into_source_partition_empties_the_download() {
        let mut job = fast_job();
        job.writer.partition = Some(SOURCE_PARTITION.to_string());
        job.writer.truncate = true;

        let report = simulate(&job, 10, 2).unwrap();
        assert_eq!(report.downloaded_rows, 10);
        assert_eq!(report.uploaded_rows, 10);
    }

    #[test]
    fn no_rows() {
        let report = simulate(&fast_job(), 0, 4).unwrap();
        assert_eq!(report.scanned_rows, 0);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.uploaded_rows, 0);
    }
}
