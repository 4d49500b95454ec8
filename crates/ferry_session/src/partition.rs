//! Partition specs and the pre-write partition lifecycle check.

use crate::ddl::{DdlExecutor, DdlRunner, DdlStatement};
use crate::error::{RemoteResult, SessionError, SessionResult};
use crate::session::TableDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// An ordered list of partition column assignments, e.g. `pt=1,ds=hangzhou`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionSpec {
    columns: Vec<(String, String)>,
}

impl PartitionSpec {
    /// Parses `col=value` pairs separated by commas.
    ///
    /// Whitespace around names and values is trimmed and single quotes are
    /// stripped from values.
    pub fn parse(text: &str) -> SessionResult<Self> {
        let mut columns = Vec::new();
        for part in text.split(',') {
            let kv: Vec<&str> = part.split('=').collect();
            let (name, value) = match kv.as_slice() {
                [name, value] => (name.trim(), value.trim().replace('\'', "")),
                _ => {
                    return Err(SessionError::InvalidPartitionSpec(format!(
                        "{text}: expected col=value pairs such as pt=1,ds=hangzhou"
                    )))
                }
            };
            if name.is_empty() {
                return Err(SessionError::InvalidPartitionSpec(format!(
                    "{text}: empty partition column name"
                )));
            }
            if value.is_empty() {
                return Err(SessionError::InvalidPartitionSpec(format!(
                    "{text}: partition column {name} has no value"
                )));
            }
            columns.push((name.to_string(), value));
        }
        Ok(Self { columns })
    }

    /// The column assignments in order.
    pub fn columns(&self) -> &[(String, String)] {
        &self.columns
    }

    /// Column list for DDL, with quoted values: `pt='1',ds='hangzhou'`.
    pub fn ddl_clause(&self) -> String {
        self.columns
            .iter()
            .map(|(name, value)| format!("{name}='{value}'"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .columns
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&text)
    }
}

/// Table metadata needed before writing.
pub trait TableCatalog: Send + Sync {
    /// Partition column names; empty for an unpartitioned table.
    fn partition_columns(&self, project: &str, table: &str) -> RemoteResult<Vec<String>>;

    /// Existing partitions of the table.
    fn list_partitions(&self, project: &str, table: &str) -> RemoteResult<Vec<PartitionSpec>>;
}

/// Brings the write target into the state a write session expects.
///
/// - overwrite, partitioned: drop the partition if present, then add it
/// - overwrite, unpartitioned: truncate the table
/// - append, partitioned: add the partition if missing
/// - append, unpartitioned: nothing
///
/// The existence check and the DDL are separate calls, so a concurrent
/// writer may win the race. "Already exists" on add and "not found" on drop
/// are taken as success.
pub struct PartitionLifecycle<C: TableCatalog + ?Sized, R: DdlRunner + ?Sized> {
    catalog: Arc<C>,
    ddl: DdlExecutor<R>,
}

impl<C: TableCatalog + ?Sized, R: DdlRunner + ?Sized> PartitionLifecycle<C, R> {
    /// Creates a lifecycle check.
    pub fn new(catalog: Arc<C>, ddl: DdlExecutor<R>) -> Self {
        Self { catalog, ddl }
    }

    /// Prepares `target` for writing.
    pub fn prepare(&self, target: &TableDescriptor, overwrite: bool) -> SessionResult<()> {
        let partitioned = !self
            .catalog
            .partition_columns(&target.project, &target.table)?
            .is_empty();

        match (partitioned, &target.partition) {
            (true, None) => Err(SessionError::InvalidPartitionSpec(format!(
                "table {} is partitioned; a target partition such as pt=20240301 is required",
                target.table
            ))),
            (false, Some(partition)) => Err(SessionError::InvalidPartitionSpec(format!(
                "table {} is not partitioned but partition {partition} was given",
                target.table
            ))),
            (true, Some(partition)) if overwrite => {
                info!(table = %target.table, %partition, "overwriting partition");
                if self.partition_exists(target, partition)? {
                    self.run_tolerant(
                        target,
                        &DdlStatement::DropPartition {
                            table: target.table.clone(),
                            partition: partition.clone(),
                        },
                    )?;
                }
                self.add_partition(target, partition)
            }
            (true, Some(partition)) => {
                if self.partition_exists(target, partition)? {
                    debug!(table = %target.table, %partition, "partition already present");
                    Ok(())
                } else {
                    info!(table = %target.table, %partition, "adding missing partition");
                    self.add_partition(target, partition)
                }
            }
            (false, None) if overwrite => {
                info!(table = %target.table, "truncating table");
                self.run_tolerant(
                    target,
                    &DdlStatement::Truncate {
                        table: target.table.clone(),
                    },
                )
            }
            (false, None) => Ok(()),
        }
    }

    fn partition_exists(
        &self,
        target: &TableDescriptor,
        partition: &PartitionSpec,
    ) -> SessionResult<bool> {
        let existing = self
            .catalog
            .list_partitions(&target.project, &target.table)?;
        Ok(existing.contains(partition))
    }

    fn add_partition(
        &self,
        target: &TableDescriptor,
        partition: &PartitionSpec,
    ) -> SessionResult<()> {
        self.run_tolerant(
            target,
            &DdlStatement::AddPartition {
                table: target.table.clone(),
                partition: partition.clone(),
            },
        )
    }

    fn run_tolerant(&self, target: &TableDescriptor, statement: &DdlStatement) -> SessionResult<()> {
        match self.ddl.run(statement) {
            Err(SessionError::Remote(err)) if statement.tolerates(&err) => {
                debug!(statement = %statement, error = %err, "ddl race resolved as success");
                Ok(())
            }
            Err(SessionError::Remote(err)) => Err(SessionError::PartitionConflict {
                table: target.table.clone(),
                partition: target
                    .partition
                    .as_ref()
                    .map_or_else(|| "-".to_string(), ToString::to_string),
                source: err,
            }),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_partition_spec() {
        let spec = PartitionSpec::parse("pt=1, ds='hangzhou'").unwrap();
        assert_eq!(
            spec.columns(),
            &[
                ("pt".to_string(), "1".to_string()),
                ("ds".to_string(), "hangzhou".to_string()),
            ]
        );
        assert_eq!(spec.to_string(), "pt=1,ds=hangzhou");
        assert_eq!(spec.ddl_clause(), "pt='1',ds='hangzhou'");
    }

    #[test]
    fn reject_malformed_partition_spec() {
        for text in ["", "pt", "pt=1=2", "pt=1,", "=1", "pt=", "pt=''", "pt=1,ds= "] {
            assert!(
                matches!(
                    PartitionSpec::parse(text),
                    Err(SessionError::InvalidPartitionSpec(_))
                ),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn equal_specs_compare_equal() {
        assert_eq!(
            PartitionSpec::parse("pt='1'").unwrap(),
            PartitionSpec::parse("pt=1").unwrap()
        );
    }
}
