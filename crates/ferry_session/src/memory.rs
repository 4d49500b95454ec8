//! In-memory warehouse for tests and dry runs.
//!
//! Implements every remote seam of this crate against plain collections and
//! lets tests script failures per operation.

use crate::ddl::{DdlRunner, JobStatus};
use crate::error::{RemoteError, RemoteResult};
use crate::partition::{PartitionSpec, TableCatalog};
use crate::session::{
    Record, RecordReader, RecordWriter, SessionClient, SessionInfo, SessionMode, TableDescriptor,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

/// Remote operations of [`MemoryWarehouse`], for fault injection and call
/// counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarehouseOp {
    /// `SessionClient::create_session`.
    CreateSession,
    /// `SessionClient::get_session`.
    GetSession,
    /// `SessionClient::open_reader`.
    OpenReader,
    /// `SessionClient::open_writer`.
    OpenWriter,
    /// `SessionClient::commit_upload`.
    Commit,
    /// `DdlRunner::submit`.
    Submit,
    /// `DdlRunner::poll`.
    Poll,
}

#[derive(Default)]
struct TableState {
    partition_columns: Vec<String>,
    partitions: Vec<PartitionSpec>,
    rows: HashMap<Option<PartitionSpec>, Vec<Record>>,
}

impl TableState {
    fn is_partitioned(&self) -> bool {
        !self.partition_columns.is_empty()
    }
}

struct SessionState {
    mode: SessionMode,
    table: TableDescriptor,
    snapshot: Arc<Vec<Record>>,
    blocks: HashMap<u64, Vec<Record>>,
}

struct JobState {
    running_polls: u32,
    outcome: JobStatus,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, TableState>,
    sessions: HashMap<String, SessionState>,
    jobs: HashMap<String, JobState>,
    faults: HashMap<WarehouseOp, VecDeque<RemoteError>>,
    calls: HashMap<WarehouseOp, usize>,
    failing_jobs: VecDeque<String>,
    running_polls: u32,
    executed: Vec<String>,
}

impl Inner {
    fn enter(&mut self, op: WarehouseOp) -> RemoteResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => {
                trace!(?op, error = %err, "injected fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn table(&self, name: &str) -> RemoteResult<&TableState> {
        self.tables
            .get(name)
            .ok_or_else(|| RemoteError::NotFound(format!("table {name}")))
    }

    fn table_mut(&mut self, name: &str) -> RemoteResult<&mut TableState> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| RemoteError::NotFound(format!("table {name}")))
    }

    fn session(&self, id: &str) -> RemoteResult<&SessionState> {
        self.sessions
            .get(id)
            .ok_or_else(|| RemoteError::NotFound(format!("session {id}")))
    }

    fn apply_ddl(&mut self, sql: &str) -> Result<(), String> {
        let sql = sql.trim().trim_end_matches(';').trim();

        if let Some(table) = sql.strip_prefix("truncate table ") {
            let state = self.table_mut(table.trim()).map_err(|e| e.to_string())?;
            state.rows.clear();
            return Ok(());
        }

        let Some(rest) = sql.strip_prefix("alter table ") else {
            return Err(format!("unsupported statement: {sql}"));
        };
        let mut words = rest.split_whitespace();
        let table = words.next().unwrap_or_default().to_string();
        let action = words.next().unwrap_or_default().to_string();
        let partition = rest
            .split_once("partition(")
            .and_then(|(_, tail)| tail.rsplit_once(')'))
            .map(|(clause, _)| clause)
            .ok_or_else(|| format!("missing partition clause: {sql}"))?;
        let partition = PartitionSpec::parse(partition).map_err(|e| e.to_string())?;

        let state = self.table_mut(&table).map_err(|e| e.to_string())?;
        match action.as_str() {
            "add" => {
                if !state.partitions.contains(&partition) {
                    state.partitions.push(partition.clone());
                    state.rows.entry(Some(partition)).or_default();
                }
                Ok(())
            }
            "drop" => {
                state.partitions.retain(|p| p != &partition);
                state.rows.remove(&Some(partition));
                Ok(())
            }
            other => Err(format!("unsupported alter action {other}")),
        }
    }
}

/// A single-project analytical store held in memory.
///
/// Download sessions snapshot their rows at creation. Upload sessions buffer
/// written blocks until commit, then append them to the target partition.
#[derive(Clone)]
pub struct MemoryWarehouse {
    project: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    /// Creates an empty warehouse serving `project`.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Creates (or replaces) a table. Empty `partition_columns` means
    /// unpartitioned.
    pub fn create_table(&self, table: &str, partition_columns: &[&str]) {
        self.inner.lock().tables.insert(
            table.to_string(),
            TableState {
                partition_columns: partition_columns.iter().map(|c| c.to_string()).collect(),
                ..TableState::default()
            },
        );
    }

    /// Appends rows, creating the partition if needed.
    pub fn insert_rows(
        &self,
        table: &str,
        partition: Option<&PartitionSpec>,
        rows: Vec<Record>,
    ) -> RemoteResult<()> {
        let mut inner = self.inner.lock();
        let state = inner.table_mut(table)?;
        check_layout(table, state, partition)?;
        if let Some(partition) = partition {
            if !state.partitions.contains(partition) {
                state.partitions.push(partition.clone());
            }
        }
        state
            .rows
            .entry(partition.cloned())
            .or_default()
            .extend(rows);
        Ok(())
    }

    /// Rows currently visible in a table or partition.
    pub fn rows(&self, table: &str, partition: Option<&PartitionSpec>) -> Vec<Record> {
        let inner = self.inner.lock();
        inner
            .tables
            .get(table)
            .and_then(|state| state.rows.get(&partition.cloned()))
            .cloned()
            .unwrap_or_default()
    }

    /// Makes the next `times` calls of `op` fail with `error`.
    pub fn fail_next(&self, op: WarehouseOp, times: usize, error: RemoteError) {
        let mut inner = self.inner.lock();
        let queue = inner.faults.entry(op).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    /// Number of calls made to `op`, failed ones included.
    pub fn call_count(&self, op: WarehouseOp) -> usize {
        self.inner.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Makes the next submitted job finish as failed with `diagnostic`.
    pub fn fail_next_job(&self, diagnostic: impl Into<String>) {
        self.inner.lock().failing_jobs.push_back(diagnostic.into());
    }

    /// Number of `Running` answers each new job gives before finishing.
    pub fn set_running_polls(&self, polls: u32) {
        self.inner.lock().running_polls = polls;
    }

    /// Statements that were submitted and applied, in order.
    pub fn executed_ddl(&self) -> Vec<String> {
        self.inner.lock().executed.clone()
    }

    fn check_project(&self, project: &str) -> RemoteResult<()> {
        if project == self.project {
            Ok(())
        } else {
            Err(RemoteError::Unauthorized(format!(
                "no access to project {project}"
            )))
        }
    }
}

fn check_layout(
    table: &str,
    state: &TableState,
    partition: Option<&PartitionSpec>,
) -> RemoteResult<()> {
    match (state.is_partitioned(), partition) {
        (true, None) => Err(RemoteError::InvalidDescriptor(format!(
            "table {table} is partitioned; a partition is required"
        ))),
        (false, Some(p)) => Err(RemoteError::InvalidDescriptor(format!(
            "table {table} is not partitioned, got partition {p}"
        ))),
        _ => Ok(()),
    }
}

impl SessionClient for MemoryWarehouse {
    fn create_session(
        &self,
        mode: SessionMode,
        table: &TableDescriptor,
    ) -> RemoteResult<SessionInfo> {
        let mut inner = self.inner.lock();
        inner.enter(WarehouseOp::CreateSession)?;
        self.check_project(&table.project)?;

        let state = inner.table(&table.table)?;
        check_layout(&table.table, state, table.partition.as_ref())?;

        let snapshot = match mode {
            SessionMode::Download => match state.rows.get(&table.partition) {
                Some(rows) => rows.clone(),
                None if table.partition.is_none() => Vec::new(),
                None => {
                    return Err(RemoteError::NotFound(format!(
                        "partition {} of {}",
                        table.partition.as_ref().map(ToString::to_string).unwrap_or_default(),
                        table.table
                    )))
                }
            },
            SessionMode::Upload => Vec::new(),
        };
        let record_count = match mode {
            SessionMode::Download => Some(snapshot.len() as u64),
            SessionMode::Upload => None,
        };

        let id = Uuid::new_v4().simple().to_string();
        inner.sessions.insert(
            id.clone(),
            SessionState {
                mode,
                table: table.clone(),
                snapshot: Arc::new(snapshot),
                blocks: HashMap::new(),
            },
        );
        Ok(SessionInfo { id, record_count })
    }

    fn get_session(
        &self,
        mode: SessionMode,
        table: &TableDescriptor,
        session_id: &str,
    ) -> RemoteResult<SessionInfo> {
        let mut inner = self.inner.lock();
        inner.enter(WarehouseOp::GetSession)?;
        self.check_project(&table.project)?;

        let session = inner.session(session_id)?;
        if session.mode != mode || &session.table != table {
            return Err(RemoteError::InvalidDescriptor(format!(
                "session {session_id} belongs to {} ({:?})",
                session.table, session.mode
            )));
        }
        let record_count = match mode {
            SessionMode::Download => Some(session.snapshot.len() as u64),
            SessionMode::Upload => None,
        };
        Ok(SessionInfo {
            id: session_id.to_string(),
            record_count,
        })
    }

    fn open_reader(
        &self,
        session_id: &str,
        offset: u64,
        count: u64,
        _compressed: bool,
    ) -> RemoteResult<Box<dyn RecordReader>> {
        let mut inner = self.inner.lock();
        inner.enter(WarehouseOp::OpenReader)?;

        let session = inner.session(session_id)?;
        let total = session.snapshot.len() as u64;
        let end = offset.checked_add(count).unwrap_or(u64::MAX);
        if end > total {
            return Err(RemoteError::Rejected(format!(
                "range [{offset}, {end}) exceeds {total} records"
            )));
        }
        let rows = session.snapshot[offset as usize..end as usize].to_vec();
        Ok(Box::new(MemoryReader {
            rows: rows.into_iter(),
        }))
    }

    fn open_writer(
        &self,
        session_id: &str,
        block_id: u64,
        _compressed: bool,
    ) -> RemoteResult<Box<dyn RecordWriter>> {
        let mut inner = self.inner.lock();
        inner.enter(WarehouseOp::OpenWriter)?;
        inner.session(session_id)?;
        Ok(Box::new(MemoryWriter {
            inner: Arc::clone(&self.inner),
            session_id: session_id.to_string(),
            block_id,
            buffer: Vec::new(),
            closed: false,
        }))
    }

    fn commit_upload(&self, session_id: &str, blocks: &[u64]) -> RemoteResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(WarehouseOp::Commit)?;

        let session = inner.session(session_id)?;
        if let Some(block) = blocks.iter().find(|b| !session.blocks.contains_key(*b)) {
            return Err(RemoteError::Rejected(format!(
                "block {block} was never closed"
            )));
        }
        let target = session.table.clone();
        let state = inner.table(&target.table)?;
        if let Some(partition) = &target.partition {
            if !state.partitions.contains(partition) {
                return Err(RemoteError::NotFound(format!(
                    "partition {partition} of {}",
                    target.table
                )));
            }
        }

        // Validated; blocks leave the session only once the whole commit applies.
        let mut committed = Vec::new();
        if let Some(session) = inner.sessions.get_mut(session_id) {
            for block in blocks {
                committed.extend(session.blocks.remove(block).unwrap_or_default());
            }
        }
        inner
            .table_mut(&target.table)?
            .rows
            .entry(target.partition.clone())
            .or_default()
            .extend(committed);
        Ok(())
    }
}

impl DdlRunner for MemoryWarehouse {
    fn submit(&self, statement: &str, task_name: &str) -> RemoteResult<String> {
        let mut inner = self.inner.lock();
        inner.enter(WarehouseOp::Submit)?;

        let scripted_failure = inner.failing_jobs.pop_front();
        let outcome = match scripted_failure {
            Some(diagnostic) => JobStatus::Failed(diagnostic),
            None => match inner.apply_ddl(statement) {
                Ok(()) => {
                    inner.executed.push(statement.to_string());
                    JobStatus::Success
                }
                Err(diagnostic) => JobStatus::Failed(diagnostic),
            },
        };
        trace!(task = task_name, ?outcome, "job submitted");

        let job = Uuid::new_v4().simple().to_string();
        let running_polls = inner.running_polls;
        inner.jobs.insert(
            job.clone(),
            JobState {
                running_polls,
                outcome,
            },
        );
        Ok(job)
    }

    fn poll(&self, job_id: &str) -> RemoteResult<JobStatus> {
        let mut inner = self.inner.lock();
        inner.enter(WarehouseOp::Poll)?;

        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| RemoteError::NotFound(format!("job {job_id}")))?;
        if job.running_polls > 0 {
            job.running_polls -= 1;
            return Ok(JobStatus::Running);
        }
        Ok(job.outcome.clone())
    }
}

impl TableCatalog for MemoryWarehouse {
    fn partition_columns(&self, project: &str, table: &str) -> RemoteResult<Vec<String>> {
        self.check_project(project)?;
        Ok(self.inner.lock().table(table)?.partition_columns.clone())
    }

    fn list_partitions(&self, project: &str, table: &str) -> RemoteResult<Vec<PartitionSpec>> {
        self.check_project(project)?;
        Ok(self.inner.lock().table(table)?.partitions.clone())
    }
}

struct MemoryReader {
    rows: std::vec::IntoIter<Record>,
}

impl RecordReader for MemoryReader {
    fn read(&mut self) -> RemoteResult<Option<Record>> {
        Ok(self.rows.next())
    }
}

struct MemoryWriter {
    inner: Arc<Mutex<Inner>>,
    session_id: String,
    block_id: u64,
    buffer: Vec<Record>,
    closed: bool,
}

impl RecordWriter for MemoryWriter {
    fn write(&mut self, record: Record) -> RemoteResult<()> {
        if self.closed {
            return Err(RemoteError::Rejected(format!(
                "block {} already closed",
                self.block_id
            )));
        }
        self.buffer.push(record);
        Ok(())
    }

    fn close(&mut self) -> RemoteResult<()> {
        if self.closed {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(&self.session_id)
            .ok_or_else(|| RemoteError::NotFound(format!("session {}", self.session_id)))?;
        session
            .blocks
            .entry(self.block_id)
            .or_default()
            .append(&mut self.buffer);
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_plan::Value;

    fn spec(text: &str) -> PartitionSpec {
        PartitionSpec::parse(text).unwrap()
    }

    #[test]
    fn upload_becomes_visible_on_commit() {
        let warehouse = MemoryWarehouse::new("analytics");
        warehouse.create_table("events", &[]);
        let table = TableDescriptor::new("analytics", "events");

        let info = warehouse
            .create_session(SessionMode::Upload, &table)
            .unwrap();
        let mut writer = warehouse.open_writer(&info.id, 0, true).unwrap();
        writer.write(vec![Value::Int(1)]).unwrap();
        writer.close().unwrap();
        assert!(warehouse.rows("events", None).is_empty());

        warehouse.commit_upload(&info.id, &[0]).unwrap();
        assert_eq!(warehouse.rows("events", None), vec![vec![Value::Int(1)]]);
    }

    #[test]
    fn commit_of_unclosed_block_is_rejected() {
        let warehouse = MemoryWarehouse::new("analytics");
        warehouse.create_table("events", &[]);
        let table = TableDescriptor::new("analytics", "events");
        let info = warehouse
            .create_session(SessionMode::Upload, &table)
            .unwrap();

        let err = warehouse.commit_upload(&info.id, &[7]).unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(_)));
    }

    #[test]
    fn rejected_commit_keeps_closed_blocks() {
        let warehouse = MemoryWarehouse::new("analytics");
        warehouse.create_table("events", &[]);
        let table = TableDescriptor::new("analytics", "events");
        let info = warehouse
            .create_session(SessionMode::Upload, &table)
            .unwrap();
        let mut writer = warehouse.open_writer(&info.id, 0, false).unwrap();
        writer.write(vec![Value::Int(1)]).unwrap();
        writer.close().unwrap();

        let err = warehouse.commit_upload(&info.id, &[0, 7]).unwrap_err();
        assert_eq!(err, RemoteError::Rejected("block 7 was never closed".into()));
        assert!(warehouse.rows("events", None).is_empty());

        warehouse.commit_upload(&info.id, &[0]).unwrap();
        assert_eq!(warehouse.rows("events", None), vec![vec![Value::Int(1)]]);
    }

    #[test]
    fn commit_into_dropped_partition_keeps_blocks() {
        let warehouse = MemoryWarehouse::new("analytics");
        warehouse.create_table("events", &["pt"]);
        warehouse.insert_rows("events", Some(&spec("pt=1")), Vec::new()).unwrap();
        let table = TableDescriptor::new("analytics", "events").with_partition(spec("pt=1"));
        let info = warehouse
            .create_session(SessionMode::Upload, &table)
            .unwrap();
        let mut writer = warehouse.open_writer(&info.id, 0, false).unwrap();
        writer.write(vec![Value::Int(2)]).unwrap();
        writer.close().unwrap();

        let job = warehouse
            .submit("alter table events drop IF EXISTS partition(pt='1');", "t1")
            .unwrap();
        assert_eq!(warehouse.poll(&job).unwrap(), JobStatus::Success);
        let err = warehouse.commit_upload(&info.id, &[0]).unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));

        let job = warehouse
            .submit("alter table events add IF NOT EXISTS partition(pt='1');", "t2")
            .unwrap();
        assert_eq!(warehouse.poll(&job).unwrap(), JobStatus::Success);
        warehouse.commit_upload(&info.id, &[0]).unwrap();
        assert_eq!(
            warehouse.rows("events", Some(&spec("pt=1"))),
            vec![vec![Value::Int(2)]]
        );
    }

    #[test]
    fn ddl_statements_apply() {
        let warehouse = MemoryWarehouse::new("analytics");
        warehouse.create_table("events", &["pt"]);

        let job = warehouse
            .submit("alter table events add IF NOT EXISTS partition(pt='1');", "t1")
            .unwrap();
        assert_eq!(warehouse.poll(&job).unwrap(), JobStatus::Success);
        assert_eq!(
            warehouse.list_partitions("analytics", "events").unwrap(),
            vec![spec("pt=1")]
        );

        warehouse
            .submit("alter table events drop IF EXISTS partition(pt='1');", "t2")
            .unwrap();
        assert!(warehouse
            .list_partitions("analytics", "events")
            .unwrap()
            .is_empty());
        assert_eq!(warehouse.executed_ddl().len(), 2);
    }

    #[test]
    fn unknown_table_fails_the_job() {
        let warehouse = MemoryWarehouse::new("analytics");
        let job = warehouse.submit("truncate table missing;", "t1").unwrap();
        assert!(matches!(warehouse.poll(&job).unwrap(), JobStatus::Failed(_)));
        assert!(warehouse.executed_ddl().is_empty());
    }

    #[test]
    fn jobs_report_running_first() {
        let warehouse = MemoryWarehouse::new("analytics");
        warehouse.create_table("events", &[]);
        warehouse.set_running_polls(2);

        let job = warehouse.submit("truncate table events;", "t1").unwrap();
        assert_eq!(warehouse.poll(&job).unwrap(), JobStatus::Running);
        assert_eq!(warehouse.poll(&job).unwrap(), JobStatus::Running);
        assert_eq!(warehouse.poll(&job).unwrap(), JobStatus::Success);
        assert_eq!(warehouse.call_count(WarehouseOp::Poll), 3);
    }

    #[test]
    fn download_snapshot_ignores_later_inserts() {
        let warehouse = MemoryWarehouse::new("analytics");
        warehouse.create_table("events", &[]);
        warehouse
            .insert_rows("events", None, vec![vec![Value::Int(1)]])
            .unwrap();
        let table = TableDescriptor::new("analytics", "events");

        let info = warehouse
            .create_session(SessionMode::Download, &table)
            .unwrap();
        warehouse
            .insert_rows("events", None, vec![vec![Value::Int(2)]])
            .unwrap();

        assert_eq!(info.record_count, Some(1));
        assert!(warehouse.open_reader(&info.id, 0, 2, false).is_err());
    }

    #[test]
    fn partition_layout_is_checked() {
        let warehouse = MemoryWarehouse::new("analytics");
        warehouse.create_table("events", &["pt"]);
        let err = warehouse
            .insert_rows("events", None, vec![])
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidDescriptor(_)));
    }
}
