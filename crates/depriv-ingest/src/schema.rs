//! Destination naming for extracted files
//!
//! The mapping from an archive-relative path to `(schema, table)` is a pure
//! function, so repeated loads of the same archive replace the same tables.
//! The top-level directory becomes the schema (the dataset slug for files at
//! the archive root) and the file stem becomes the table.

use crate::extract::ExtractedFile;
use depriv_common::{LoaderError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path};

/// Fully qualified destination of one file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableTarget {
    pub schema: String,
    pub table: String,
}

impl TableTarget {
    /// `schema.table`
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// `"schema"."table"`, safe to splice into SQL
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(&self.table))
    }
}

impl fmt::Display for TableTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// A file paired with the table it will be loaded into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTable {
    pub target: TableTarget,
    pub file: ExtractedFile,
}

/// Double-quote an identifier for DuckDB
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Lowercase `raw` and reduce it to `[a-z0-9_]`
///
/// Runs of other characters collapse to a single `_`, edges are trimmed, and a
/// leading digit gets a `t_` prefix.
pub fn normalize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_underscore = false;

    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_underscore && !out.is_empty() {
                out.push('_');
            }
            pending_underscore = false;
            out.push(ch);
        } else {
            pending_underscore = true;
        }
    }

    match out.chars().next() {
        None => "unnamed".to_string(),
        Some(first) if first.is_ascii_digit() => format!("t_{}", out),
        Some(_) => out,
    }
}

/// Map an archive-relative path to its destination table
pub fn target_for(relative: &Path, group_key: &str) -> TableTarget {
    let dirs: Vec<String> = relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let schema = match dirs.first() {
        Some(top) => normalize_identifier(top),
        None => normalize_identifier(group_key),
    };

    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    TableTarget {
        schema,
        table: normalize_identifier(&stem),
    }
}

/// Map every file, failing on the first two that share a destination
pub fn plan_targets(
    dataset: &'static str,
    files: &[ExtractedFile],
    group_key: &str,
) -> Result<Vec<PlannedTable>> {
    let mut seen: HashMap<TableTarget, &ExtractedFile> = HashMap::with_capacity(files.len());
    let mut planned = Vec::with_capacity(files.len());

    for file in files {
        let target = target_for(&file.relative, group_key);
        if let Some(first) = seen.get(&target) {
            return Err(LoaderError::NameCollision {
                dataset,
                target: target.qualified(),
                first: first.relative.clone(),
                second: file.relative.clone(),
            });
        }
        seen.insert(target.clone(), file);
        planned.push(PlannedTable {
            target,
            file: file.clone(),
        });
    }

    Ok(planned)
}
