//! JSON job file.

use super::error::{CliError, CliResult};
use bytes::Bytes;
use ferry_plan::{KeyBound, KeyInterval, PartitionBoundary};
use ferry_scan::ScanOptions;
use ferry_session::{SessionConfig, WriterConfig};
use serde::Deserialize;
use std::path::Path;

/// Settings of one ferry job.
///
/// A range job names `table`, the row key bounds and the region split
/// points; a count job names `record_count` and `parallelism`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobFile {
    /// Table to plan.
    pub table: Option<String>,
    /// Start row key (inclusive); empty means unbounded.
    pub start_rowkey: String,
    /// End row key (exclusive); empty means unbounded.
    pub end_rowkey: String,
    /// Row keys and region points use binary key text.
    pub binary_rowkey: bool,
    /// Region split points in ascending order.
    pub regions: Vec<String>,
    /// Records to split positionally.
    pub record_count: Option<i64>,
    /// Number of positional chunks.
    pub parallelism: Option<usize>,
    /// Rows per scanner round trip.
    pub scan_cache_size: usize,
    /// Cells per row slice; zero or negative for whole rows.
    pub scan_batch_size: i64,
    /// Remote session settings.
    pub session: Option<SessionConfig>,
    /// Write target settings.
    pub writer: WriterConfig,
}

impl Default for JobFile {
    fn default() -> Self {
        Self {
            table: None,
            start_rowkey: String::new(),
            end_rowkey: String::new(),
            binary_rowkey: false,
            regions: Vec::new(),
            record_count: None,
            parallelism: None,
            scan_cache_size: ScanOptions::DEFAULT_CACHING,
            scan_batch_size: -1,
            session: None,
            writer: WriterConfig::default(),
        }
    }
}

impl JobFile {
    /// Reads a job file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CliError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The requested key interval.
    pub fn interval(&self) -> CliResult<KeyInterval> {
        Ok(KeyInterval::parse(
            &self.start_rowkey,
            &self.end_rowkey,
            self.binary_rowkey,
        )?)
    }

    /// Configured region split points as raw keys, sorted and deduplicated.
    pub fn split_points(&self) -> Vec<Bytes> {
        let mut points: Vec<Bytes> = self
            .regions
            .iter()
            .map(|text| KeyBound::parse(text, self.binary_rowkey).to_raw())
            .filter(|raw| !raw.is_empty())
            .collect();
        points.sort();
        points.dedup();
        points
    }

    /// Region boundaries cut at the configured split points.
    pub fn boundaries(&self) -> Vec<PartitionBoundary> {
        PartitionBoundary::covering(&self.split_points())
    }

    /// Scanner options.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::new(self.scan_cache_size).with_batch(self.scan_batch_size)
    }
}

/// Reads `path` when given, else starts from defaults.
pub fn load_or_default(path: Option<&Path>) -> CliResult<JobFile> {
    match path {
        Some(path) => JobFile::load(path),
        None => Ok(JobFile::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_job(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_range_job() {
        let file = write_job(
            r#"{
                "table": "orders",
                "start_rowkey": "c",
                "end_rowkey": "v",
                "regions": ["t", "m"],
                "scan_cache_size": 50,
                "scan_batch_size": 10
            }"#,
        );
        let job = JobFile::load(file.path()).unwrap();

        assert_eq!(job.table.as_deref(), Some("orders"));
        assert_eq!(job.boundaries().len(), 3);
        assert_eq!(job.interval().unwrap().to_string(), "[c, v)");
        assert_eq!(job.scan_options().caching, 50);
        assert_eq!(job.scan_options().batch, Some(10));
    }

    #[test]
    fn load_count_job_with_session() {
        let file = write_job(
            r#"{
                "record_count": 10,
                "parallelism": 3,
                "session": {
                    "project": "analytics",
                    "compress": true,
                    "retry": { "max_attempts": 5, "interval_ms": 10, "exponential": false }
                },
                "writer": { "partition": "pt=1", "truncate": true }
            }"#,
        );
        let job = JobFile::load(file.path()).unwrap();

        assert_eq!(job.record_count, Some(10));
        assert_eq!(job.parallelism, Some(3));
        let session = job.session.as_ref().unwrap();
        assert_eq!(session.project, "analytics");
        assert_eq!(session.retry.max_attempts, 5);
        assert!(job.writer.truncate);
        assert_eq!(job.scan_options(), ScanOptions::default());
    }

    #[test]
    fn binary_region_points() {
        let file = write_job(
            r#"{ "binary_rowkey": true, "start_rowkey": "\\x00", "regions": ["\\x80", ""] }"#,
        );
        let job = JobFile::load(file.path()).unwrap();

        let boundaries = job.boundaries();
        assert_eq!(boundaries.len(), 2);
        assert!(boundaries[1].contains(&[0x80]));
        assert!(!job.interval().unwrap().contains(&[]));
    }

    #[test]
    fn malformed_job_is_reported_with_path() {
        let file = write_job("{ \"record_count\": \"ten\" }");
        let err = JobFile::load(file.path()).unwrap_err();
        assert!(matches!(err, CliError::Json { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn missing_job_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = JobFile::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
