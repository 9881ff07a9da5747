//! DuckDB loader
//!
//! All tables of one run are written inside a single transaction. The first
//! file that fails rolls everything back, leaving the database exactly as it
//! was before the run. Tables are created with `CREATE OR REPLACE`, so loading
//! the same archive twice replaces rather than duplicates.

use crate::extract::ExtractedFile;
use crate::schema::{quote_identifier, PlannedTable, TableTarget};
use depriv_common::{LoaderError, Result};
use duckdb::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One table written by the loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTable {
    pub target: TableTarget,
    pub rows: u64,
}

/// Exclusive write handle on the local database
pub struct Loader {
    dataset: &'static str,
    conn: Connection,
    db_path: PathBuf,
    in_transaction: bool,
}

impl Loader {
    /// Open (creating if absent) the database at `db_path`
    pub fn open(dataset: &'static str, db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path).map_err(|e| LoaderError::load(dataset, db_path, e))?;
        debug!(path = %db_path.display(), "Opened database");

        Ok(Self {
            dataset,
            conn,
            db_path: db_path.to_path_buf(),
            in_transaction: false,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN TRANSACTION")
            .map_err(|e| LoaderError::load(self.dataset, &self.db_path, e))?;
        self.in_transaction = true;
        Ok(())
    }

    /// Create or replace one table from its file; returns the row count
    pub fn load_table(&mut self, planned: &PlannedTable) -> Result<u64> {
        let file = &planned.file.path;
        let target = &planned.target;

        self.conn
            .execute_batch(&create_table_sql(planned))
            .map_err(|e| LoaderError::load(self.dataset, file, e))?;

        let rows: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", target.quoted()), [], |row| row.get(0))
            .map_err(|e| LoaderError::load(self.dataset, file, e))?;

        info!(table = %target, rows, file = %planned.file.relative.display(), "Loaded table");
        Ok(u64::try_from(rows).unwrap_or_default())
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| LoaderError::load(self.dataset, &self.db_path, e))?;
        self.in_transaction = false;
        debug!(path = %self.db_path.display(), "Committed load");
        Ok(())
    }

    pub fn rollback(&mut self) {
        if !self.in_transaction {
            return;
        }
        self.in_transaction = false;
        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => warn!(path = %self.db_path.display(), "Rolled back load"),
            Err(e) => warn!(error = %e, "Rollback failed"),
        }
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.rollback();
    }
}

/// Load every planned table in one transaction
pub fn load_all(dataset: &'static str, db_path: &Path, plan: &[PlannedTable]) -> Result<Vec<LoadedTable>> {
    let mut loader = Loader::open(dataset, db_path)?;
    loader.begin()?;

    let mut loaded = Vec::with_capacity(plan.len());
    for planned in plan {
        let rows = loader.load_table(planned)?;
        loaded.push(LoadedTable {
            target: planned.target.clone(),
            rows,
        });
    }

    loader.commit()?;
    Ok(loaded)
}

/// DuckDB table function reading `file` with native type inference
fn reader_expression(file: &ExtractedFile) -> String {
    let path = quote_literal(&file.path.to_string_lossy());
    let tab_separated = file
        .path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("tsv"))
        .unwrap_or(false);

    if tab_separated {
        format!("read_csv_auto({}, delim = '\\t', header = true)", path)
    } else {
        format!("read_csv_auto({}, header = true)", path)
    }
}

fn create_table_sql(planned: &PlannedTable) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS {schema};\nCREATE OR REPLACE TABLE {table} AS SELECT * FROM {reader};",
        schema = quote_identifier(&planned.target.schema),
        table = planned.target.quoted(),
        reader = reader_expression(&planned.file),
    )
}

/// Single-quote a string literal for DuckDB
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
