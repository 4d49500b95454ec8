//! Plan-count command implementation.

use super::error::{CliError, CliResult};
use super::job::JobFile;
use ferry_plan::{CountChunk, CountPartitioner};

/// Computes the chunks for a count job.
pub fn plan(job: &JobFile) -> CliResult<Vec<CountChunk>> {
    let count = job.record_count.ok_or(CliError::Missing("record_count"))?;
    let parallelism = job.parallelism.ok_or(CliError::Missing("parallelism"))?;
    Ok(CountPartitioner::new().split(count, parallelism)?)
}

/// Runs the plan-count command.
pub fn run(job: &JobFile, format: &str) -> CliResult<()> {
    let chunks = plan(job)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&chunks)?);
        }
        _ => {
            println!("{} chunk(s)", chunks.len());
            for (index, chunk) in chunks.iter().enumerate() {
                println!(
                    "  #{:<4} offset {:<10} length {}",
                    index, chunk.offset, chunk.length
                );
            }
        }
    }

    Ok(())
}
