#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the safety map scoring pipeline.
//!
//! Without a subcommand, falls back to an interactive menu. Logging goes
//! through [`safety_map_cli_utils::init_logger`] so log lines and progress
//! bars share the terminal.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use safety_map_cli::pipeline::{self, DEFAULT_INTERVAL_DAYS, DEFAULT_SINCE_DAYS, RunOptions};
use safety_map_scoring::config::DEFAULT_RESOLUTION;
use safety_map_source_models::MappingPreset;

#[derive(Parser)]
#[command(
    name = "safety_map_cli",
    about = "Crime-based safety scores on a city grid"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, score, and store once
    Run(RunArgs),
    /// Run now, then again every N days until interrupted
    Schedule {
        #[command(flatten)]
        run: RunArgs,
        /// Days between runs
        #[arg(long, default_value_t = DEFAULT_INTERVAL_DAYS)]
        interval_days: u64,
    },
    /// Show what the metric store currently holds
    Status {
        /// `DuckDB` path (defaults to `$SAFETY_MAP_DB_PATH` or `data/`)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List the safety metrics that get scored
    Metrics,
    /// List available data sources
    Sources,
}

#[derive(Args)]
struct RunArgs {
    /// Read records from a JSON array file instead of the LAPD portal
    #[arg(long)]
    input: Option<PathBuf>,
    /// Field layout of the input file (`canonical` or `lapd`)
    #[arg(long, default_value = "canonical")]
    mapping: MappingPreset,
    /// Maximum number of records to fetch
    #[arg(long)]
    limit: Option<u64>,
    /// Days of history to fetch from the portal
    #[arg(long, default_value_t = DEFAULT_SINCE_DAYS)]
    since_days: u32,
    /// `DuckDB` path (defaults to `$SAFETY_MAP_DB_PATH` or `data/`)
    #[arg(long)]
    db: Option<PathBuf>,
    /// Also write metrics to this JSON file
    #[arg(long)]
    json: Option<PathBuf>,
    /// Reference time (RFC 3339); defaults to now
    #[arg(long)]
    now: Option<DateTime<Utc>>,
    /// Grid cell size in degrees
    #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
    resolution: f64,
    /// Score without storing anything
    #[arg(long)]
    dry_run: bool,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        Self {
            input: args.input,
            mapping: args.mapping,
            limit: args.limit,
            since_days: Some(args.since_days),
            db_path: args.db,
            json_path: args.json,
            now: args.now,
            resolution: args.resolution,
            dry_run: args.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = safety_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Safety Map");
        println!();
        return safety_map_cli::interactive::run(&multi).await;
    };

    match command {
        Commands::Run(args) => {
            let summary = pipeline::run_once(&args.into(), &multi).await?;
            pipeline::print_summary(&summary);
        }
        Commands::Schedule { run, interval_days } => {
            pipeline::schedule(&run.into(), interval_days, &multi).await;
        }
        Commands::Status { db } => pipeline::print_store_status(db.as_deref())?,
        Commands::Metrics => pipeline::print_metrics(),
        Commands::Sources => pipeline::print_sources(),
    }

    Ok(())
}
