//! ferry CLI
//!
//! Planning and dry-run tools for ferry jobs.
//!
//! # Commands
//!
//! - `plan-range` - Split a row key range along region boundaries
//! - `plan-count` - Split a record count into positional chunks
//! - `escape` / `unescape` - Convert between raw keys and binary key text
//! - `demo` - Run a full plan/scan/download/upload cycle against in-memory stores

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ferry command-line tools.
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a row key range along region boundaries
    PlanRange {
        /// JSON job file; flags override its fields
        #[arg(short, long)]
        job: Option<PathBuf>,

        /// Table name
        #[arg(short, long)]
        table: Option<String>,

        /// Start row key (inclusive); empty means unbounded
        #[arg(long)]
        start: Option<String>,

        /// End row key (exclusive); empty means unbounded
        #[arg(long)]
        end: Option<String>,

        /// Row keys use binary key text (`\xHH` escapes)
        #[arg(short, long)]
        binary: bool,

        /// Region split points, comma separated
        #[arg(short, long, value_delimiter = ',')]
        regions: Vec<String>,
    },

    /// Split a record count into positional chunks
    PlanCount {
        /// JSON job file; flags override its fields
        #[arg(short, long)]
        job: Option<PathBuf>,

        /// Number of records
        #[arg(short, long)]
        count: Option<i64>,

        /// Number of chunks
        #[arg(short, long)]
        parallelism: Option<usize>,
    },

    /// Render a key as binary key text
    Escape {
        /// Key text; its UTF-8 bytes are escaped
        key: String,
    },

    /// Parse binary key text and show the key bytes
    Unescape {
        /// Binary key text
        text: String,
    },

    /// Run plan, scan, download and upload against in-memory stores
    Demo {
        /// JSON job file for session and scan settings
        #[arg(short, long)]
        job: Option<PathBuf>,

        /// Rows to generate
        #[arg(long, default_value = "1000")]
        rows: usize,

        /// Worker count for positional reads
        #[arg(short, long, default_value = "4")]
        parallelism: usize,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::PlanRange {
            job,
            table,
            start,
            end,
            binary,
            regions,
        } => {
            let mut file = commands::job::load_or_default(job.as_deref())?;
            if let Some(table) = table {
                file.table = Some(table);
            }
            if let Some(start) = start {
                file.start_rowkey = start;
            }
            if let Some(end) = end {
                file.end_rowkey = end;
            }
            if binary {
                file.binary_rowkey = true;
            }
            if !regions.is_empty() {
                file.regions = regions;
            }
            commands::plan_range::run(&file, &cli.format)?;
        }
        Commands::PlanCount {
            job,
            count,
            parallelism,
        } => {
            let mut file = commands::job::load_or_default(job.as_deref())?;
            if count.is_some() {
                file.record_count = count;
            }
            if parallelism.is_some() {
                file.parallelism = parallelism;
            }
            commands::plan_count::run(&file, &cli.format)?;
        }
        Commands::Escape { key } => {
            commands::keys::escape(&key, &cli.format)?;
        }
        Commands::Unescape { text } => {
            commands::keys::unescape(&text, &cli.format)?;
        }
        Commands::Demo {
            job,
            rows,
            parallelism,
        } => {
            let file = commands::job::load_or_default(job.as_deref())?;
            commands::demo::run(&file, rows, parallelism, &cli.format)?;
        }
        Commands::Version => {
            println!("ferry CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
