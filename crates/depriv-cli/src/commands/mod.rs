//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod list_tables;
pub mod load;
pub mod query;

use crate::error::{CliError, Result};
use depriv_ingest::config::default_db_path;
use depriv_ingest::Dataset;
use std::path::PathBuf;

/// Database path from the flag, then `<PREFIX>DB_PATH`, then the default
pub fn resolve_db_path(dataset: Dataset, flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| {
        std::env::var_os(format!("{}DB_PATH", dataset.env_prefix())).map(PathBuf::from)
    })
    .unwrap_or_else(|| default_db_path(dataset))
}

/// Tag loader errors with the binary that produced them
pub(crate) trait ForCommand<T> {
    fn for_command(self, dataset: Dataset) -> Result<T>;
}

impl<T> ForCommand<T> for depriv_ingest::Result<T> {
    fn for_command(self, dataset: Dataset) -> Result<T> {
        self.map_err(|e| CliError::from_loader(e, dataset.command_name()))
    }
}
