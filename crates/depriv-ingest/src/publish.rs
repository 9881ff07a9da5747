//! MotherDuck publishing
//!
//! Copies a finished local database into a MotherDuck database with
//! `CREATE OR REPLACE DATABASE <remote> FROM '<local file>'`.
//!
//! Token resolution order:
//! 1. explicit `--motherduck-token`
//! 2. `motherduck_token` / `MOTHERDUCK_TOKEN` environment variables
//! 3. none: DuckDB falls back to interactive browser login

use crate::dataset::Dataset;
use crate::load::quote_literal;
use crate::schema::quote_identifier;
use depriv_common::{LoaderError, Result};
use duckdb::Connection;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Environment variables consulted for a token, in order
pub const TOKEN_ENV_VARS: &[&str] = &["motherduck_token", "MOTHERDUCK_TOKEN"];

/// Remote database to publish into
#[derive(Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub remote_name: String,
    pub token: Option<String>,
}

impl PublishTarget {
    /// Target named `remote_name`, resolving the token from `explicit_token` or the environment
    pub fn new(remote_name: impl Into<String>, explicit_token: Option<&str>) -> Self {
        Self {
            remote_name: remote_name.into(),
            token: resolve_token(explicit_token),
        }
    }

    fn connection_string(&self) -> String {
        match self.token {
            Some(ref token) => format!("md:?motherduck_token={}", token),
            None => "md:".to_string(),
        }
    }
}

// Keep tokens out of logs
impl fmt::Debug for PublishTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishTarget")
            .field("remote_name", &self.remote_name)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Explicit token, else the first non-empty token environment variable
pub fn resolve_token(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| {
            TOKEN_ENV_VARS
                .iter()
                .filter_map(|name| std::env::var(name).ok())
                .map(|t| t.trim().to_string())
                .find(|t| !t.is_empty())
        })
}

/// Remote database names must be plain identifiers
pub fn validate_remote_name(name: &str) -> std::result::Result<(), String> {
    let mut chars = name.chars();
    match chars.next() {
        None => Err("remote database name is empty".to_string()),
        Some(first) if !(first.is_ascii_alphabetic() || first == '_') => Err(format!(
            "remote database name '{}' must start with a letter or underscore",
            name
        )),
        Some(_) if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') => Err(format!(
            "remote database name '{}' may only contain letters, digits and underscores",
            name
        )),
        Some(_) => Ok(()),
    }
}

/// Push the local database at `db_path` to `target`
pub fn publish(dataset: Dataset, db_path: &Path, target: &PublishTarget) -> Result<()> {
    let slug = dataset.slug();

    if !db_path.is_file() {
        return Err(LoaderError::DatabaseNotFound {
            path: db_path.to_path_buf(),
        });
    }

    validate_remote_name(&target.remote_name)
        .map_err(|msg| LoaderError::publish(slug, &target.remote_name, msg))?;

    let local = std::fs::canonicalize(db_path)?;

    info!(
        remote = %target.remote_name,
        local = %local.display(),
        authenticated = target.token.is_some(),
        "Publishing database to MotherDuck"
    );

    let conn = Connection::open(target.connection_string())
        .map_err(|e| LoaderError::publish(slug, &target.remote_name, e))?;

    conn.execute_batch(&format!(
        "CREATE OR REPLACE DATABASE {} FROM {}",
        quote_identifier(&target.remote_name),
        quote_literal(&local.to_string_lossy())
    ))
    .map_err(|e| LoaderError::publish(slug, &target.remote_name, e))?;

    info!(remote = %target.remote_name, "Publish complete");
    Ok(())
}
