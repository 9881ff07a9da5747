//! `<cmd> list-tables` command implementation

use super::{resolve_db_path, ForCommand};
use crate::error::Result;
use depriv_ingest::{query, Dataset};
use std::path::PathBuf;
use tracing::info;

pub fn run(dataset: Dataset, db_path: Option<PathBuf>) -> Result<()> {
    let db_path = resolve_db_path(dataset, db_path);
    info!(db = %db_path.display(), "Listing tables");

    let tables = query::list_tables(&db_path).for_command(dataset)?;

    if tables.is_empty() {
        println!("No tables found in database.");
        return Ok(());
    }

    println!("Found {} tables:", tables.len());
    println!();
    for table in &tables {
        println!("  {}", table);
    }

    Ok(())
}
