//! Depriv CLI Library
//!
//! Shared command-line front end for the `imd` and `iod` binaries. Both use
//! one clap definition, renamed per dataset at startup:
//!
//! - **Load**: download, extract and load the release (`<cmd> load`)
//! - **List Tables**: show every loaded table (`<cmd> list-tables`)
//! - **Query**: run SQL against the local database (`<cmd> query "<sql>"`)

pub mod commands;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::load::LoadArgs;
use depriv_common::logging::{init_logging, LogConfig, LogLevel, WorkerGuard};
use depriv_ingest::Dataset;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::error;

/// Deprivation dataset loader
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download and load the dataset into DuckDB
    Load(LoadArgs),

    /// List all tables in the database
    ListTables {
        /// Path to the DuckDB database
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Execute a SQL query against the database
    Query {
        /// SQL query to execute
        sql: String,

        /// Path to the DuckDB database
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

/// Clap command named and described for `dataset`
pub fn command_for(dataset: Dataset) -> clap::Command {
    Cli::command()
        .name(dataset.command_name())
        .bin_name(dataset.command_name())
        .about(format!(
            "{} Data Loader - Download and load {} into DuckDB",
            dataset.command_name().to_uppercase(),
            dataset.title()
        ))
}

/// Entry point of both binaries; returns the process exit code
pub fn run(dataset: Dataset) -> i32 {
    run_from(dataset, std::env::args_os())
}

pub fn run_from<I, T>(dataset: Dataset, args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let _ = dotenvy::dotenv();

    let mut command = command_for(dataset);
    let cli = match command
        .try_get_matches_from_mut(args)
        .and_then(|matches| Cli::from_arg_matches(&matches))
    {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too
            let _ = e.print();
            return if e.use_stderr() { 1 } else { 0 };
        },
    };

    let Some(subcommand) = cli.command else {
        let _ = command.print_help();
        return 1;
    };

    // Held until the exit code is returned so the file log is flushed
    let _log_guard = setup_logging(dataset, cli.verbose);

    match execute(dataset, subcommand) {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            1
        },
    }
}

fn setup_logging(dataset: Dataset, verbose: bool) -> Option<WorkerGuard> {
    let config = log_config(dataset, verbose);

    // The CLI works without logging
    match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    }
}

/// Logging settings from `--verbose`, with environment variables on top
fn log_config(dataset: Dataset, verbose: bool) -> LogConfig {
    let level = if verbose { LogLevel::Debug } else { LogLevel::Warn };
    let config = LogConfig::builder()
        .level(level)
        .log_file_prefix(dataset.command_name())
        .build();

    match config.clone().with_env_overrides() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring logging environment overrides: {:#}", e);
            config
        },
    }
}

/// Execute one parsed subcommand
pub fn execute(dataset: Dataset, command: Commands) -> Result<()> {
    match command {
        Commands::Load(args) => commands::load::run(dataset, &args),
        Commands::ListTables { db_path } => commands::list_tables::run(dataset, db_path),
        Commands::Query { sql, db_path } => commands::query::run(dataset, &sql, db_path),
    }
}
