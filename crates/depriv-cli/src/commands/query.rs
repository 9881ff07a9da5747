//! `<cmd> query` command implementation
//!
//! Runs one SQL statement against the local database and prints the result
//! as a table.

use super::{resolve_db_path, ForCommand};
use crate::error::Result;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use depriv_ingest::{query, Dataset, QueryResult};
use std::path::PathBuf;
use tracing::debug;

pub fn run(dataset: Dataset, sql: &str, db_path: Option<PathBuf>) -> Result<()> {
    let db_path = resolve_db_path(dataset, db_path);
    debug!(db = %db_path.display(), sql, "Executing query");

    let result = query::query(&db_path, sql).for_command(dataset)?;
    print!("{}", format_result(&result));

    Ok(())
}

/// Table plus a row count; statements without a result set print `OK`
pub fn format_result(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return "OK\n".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(&result.columns);

    for row in result.formatted_rows() {
        table.add_row(row);
    }

    let noun = if result.rows.len() == 1 { "row" } else { "rows" };
    format!("{}\n({} {})\n", table, result.rows.len(), noun)
}
