//! Read access to a loaded database
//!
//! Used by the `list-tables` and `query` commands. Opening never creates a
//! database: a missing file is reported as [`LoaderError::DatabaseNotFound`]
//! so callers can tell "nothing loaded yet" apart from a bad query.

use depriv_common::{LoaderError, Result};
use duckdb::types::TimeUnit;
use duckdb::Connection;
use std::path::{Path, PathBuf};
use tracing::debug;

pub use duckdb::types::Value;

const LIST_TABLES_SQL: &str = "\
    SELECT table_schema, table_name \
    FROM information_schema.tables \
    WHERE table_type = 'BASE TABLE' AND table_catalog = current_database() \
    ORDER BY table_schema, table_name";

/// Column names plus rows of a finished query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row as an integer, if it is one
    pub fn scalar_i64(&self) -> Option<i64> {
        match self.rows.first()?.first()? {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::HugeInt(v) => i64::try_from(*v).ok(),
            Value::UTinyInt(v) => Some(i64::from(*v)),
            Value::USmallInt(v) => Some(i64::from(*v)),
            Value::UInt(v) => Some(i64::from(*v)),
            Value::UBigInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Every cell rendered with [`format_value`]
    pub fn formatted_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(format_value).collect())
            .collect()
    }
}

/// Handle on an existing local database
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(LoaderError::DatabaseNotFound {
                path: path.to_path_buf(),
            });
        }

        let conn = Connection::open(path).map_err(LoaderError::query)?;
        debug!(path = %path.display(), "Opened database");

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `schema.table` for every base table, ordered
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(LIST_TABLES_SQL).map_err(LoaderError::query)?;
        let names = stmt
            .query_map([], |row| {
                let schema: String = row.get(0)?;
                let table: String = row.get(1)?;
                Ok(format!("{}.{}", schema, table))
            })
            .map_err(LoaderError::query)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LoaderError::query)?;
        Ok(names)
    }

    /// Run one statement and collect everything it returns
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        debug!(sql, "Running query");
        let mut stmt = self.conn.prepare(sql).map_err(LoaderError::query)?;
        let mut rows = stmt.query([]).map_err(LoaderError::query)?;

        let columns = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();
        let width = columns.len();

        let mut collected = Vec::new();
        while let Some(row) = rows.next().map_err(LoaderError::query)? {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(LoaderError::query)?;
            collected.push(values);
        }

        Ok(QueryResult {
            columns,
            rows: collected,
        })
    }
}

pub fn list_tables(path: &Path) -> Result<Vec<String>> {
    Database::open(path)?.list_tables()
}

pub fn query(path: &Path, sql: &str) -> Result<QueryResult> {
    Database::open(path)?.query(sql)
}

/// Render one cell for terminal output; NULL renders as `NULL`
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(v) => v.to_string(),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::HugeInt(v) => v.to_string(),
        Value::UTinyInt(v) => v.to_string(),
        Value::USmallInt(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::UBigInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Text(v) => v.clone(),
        Value::Enum(v) => v.clone(),
        Value::Blob(v) => format!("<{} bytes>", v.len()),
        Value::Date32(days) => format!("date({})", days),
        Value::Timestamp(unit, v) => format!("timestamp({}{})", v, unit_suffix(*unit)),
        Value::List(items) => format!(
            "[{}]",
            items.iter().map(format_value).collect::<Vec<_>>().join(", ")
        ),
        other => format!("{:?}", other),
    }
}

fn unit_suffix(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Second => "s",
        TimeUnit::Millisecond => "ms",
        TimeUnit::Microsecond => "us",
        TimeUnit::Nanosecond => "ns",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded_db(dir: &Path) -> PathBuf {
        let path = dir.join("seeded.duckdb");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE SCHEMA scores;
             CREATE TABLE scores.income (lsoa VARCHAR, score DOUBLE);
             INSERT INTO scores.income VALUES ('E01000001', 0.25), ('E01000002', NULL);
             CREATE SCHEMA imd2025;
             CREATE TABLE imd2025.file_1 (decile INTEGER);
             CREATE VIEW imd2025.not_a_table AS SELECT 1;",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_missing_database_is_not_found() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nothing.duckdb");

        let err = list_tables(&path).unwrap_err();
        assert!(err.is_not_found());
        assert!(!path.exists(), "opening must not create a database");

        assert!(query(&path, "SELECT 1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_tables_is_ordered_and_skips_views() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(&seeded_db(temp.path())).unwrap();

        assert_eq!(
            db.list_tables().unwrap(),
            vec!["imd2025.file_1".to_string(), "scores.income".to_string()]
        );
    }

    #[test]
    fn test_query_returns_columns_and_rows() {
        let temp = TempDir::new().unwrap();
        let path = seeded_db(temp.path());

        let result = query(&path, "SELECT lsoa, score FROM scores.income ORDER BY lsoa").unwrap();
        assert_eq!(result.columns, vec!["lsoa".to_string(), "score".to_string()]);
        assert_eq!(
            result.formatted_rows(),
            vec![
                vec!["E01000001".to_string(), "0.25".to_string()],
                vec!["E01000002".to_string(), "NULL".to_string()],
            ]
        );

        let count = query(&path, "SELECT COUNT(*) FROM scores.income").unwrap();
        assert_eq!(count.scalar_i64(), Some(2));
    }

    #[test]
    fn test_bad_sql_is_query_error() {
        let temp = TempDir::new().unwrap();
        let path = seeded_db(temp.path());

        let err = query(&path, "SELECT * FROM no_such_table").unwrap_err();
        assert!(matches!(err, LoaderError::Query { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::Null), "NULL");
        assert_eq!(format_value(&Value::Boolean(true)), "true");
        assert_eq!(format_value(&Value::Text("E01".into())), "E01");
        assert_eq!(
            format_value(&Value::List(vec![Value::Int(1), Value::Int(2)])),
            "[1, 2]"
        );
    }
}
