//! Error types shared by both dataset loaders
//!
//! Every pipeline stage fails with its own [`LoaderError`] variant. Variants that
//! belong to a dataset carry its slug (`imd2025`, `iod2025`) so one error type
//! serves both command-line tools.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed underlying cause (DuckDB, HTTP, archive or filesystem error)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Pipeline stage vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Start,
    Download,
    Extract,
    Load,
    Complete,
    Error,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Load => "load",
            Stage::Complete => "complete",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the loaders
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Network or remote-resource failure while fetching the archive
    #[error("[{dataset}] download of {url} failed: {source}")]
    Download {
        dataset: &'static str,
        url: String,
        #[source]
        source: BoxError,
    },

    /// Downloaded archive does not match the configured SHA-256
    #[error("[{dataset}] checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        dataset: &'static str,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Archive is corrupt, unsupported, or could not be written out
    #[error("[{dataset}] failed to extract {archive}: {source}")]
    Extraction {
        dataset: &'static str,
        archive: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Two extracted files map to the same destination table
    #[error("[{dataset}] table name collision on {target}: {first} and {second}")]
    NameCollision {
        dataset: &'static str,
        target: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Extraction produced nothing that can be loaded
    #[error("[{dataset}] no tabular files found in {dir}")]
    NoTables {
        dataset: &'static str,
        dir: PathBuf,
    },

    /// A single file failed to ingest; the whole load was rolled back
    #[error("[{dataset}] failed to load {file}: {source}")]
    Load {
        dataset: &'static str,
        file: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("database not found at {path}")]
    DatabaseNotFound { path: PathBuf },

    #[error("query failed: {source}")]
    Query {
        #[source]
        source: BoxError,
    },

    /// Authentication or transfer failure while publishing to the remote database
    #[error("[{dataset}] publish to '{target}' failed: {source}")]
    Publish {
        dataset: &'static str,
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    pub fn download(dataset: &'static str, url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Download {
            dataset,
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn extraction(
        dataset: &'static str,
        archive: impl Into<PathBuf>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Extraction {
            dataset,
            archive: archive.into(),
            source: source.into(),
        }
    }

    pub fn load(dataset: &'static str, file: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::Load {
            dataset,
            file: file.into(),
            source: source.into(),
        }
    }

    pub fn query(source: impl Into<BoxError>) -> Self {
        Self::Query {
            source: source.into(),
        }
    }

    pub fn publish(
        dataset: &'static str,
        target: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Publish {
            dataset,
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Pipeline stage this error belongs to, if it comes from one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Download { .. } | Self::ChecksumMismatch { .. } => Some(Stage::Download),
            Self::Extraction { .. } => Some(Stage::Extract),
            Self::NameCollision { .. } | Self::NoTables { .. } | Self::Load { .. } => {
                Some(Stage::Load)
            },
            _ => None,
        }
    }

    /// Dataset slug the error is tagged with
    pub fn dataset(&self) -> Option<&'static str> {
        match self {
            Self::Download { dataset, .. }
            | Self::ChecksumMismatch { dataset, .. }
            | Self::Extraction { dataset, .. }
            | Self::NameCollision { dataset, .. }
            | Self::NoTables { dataset, .. }
            | Self::Load { dataset, .. }
            | Self::Publish { dataset, .. } => Some(*dataset),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DatabaseNotFound { .. })
    }
}
