//! Error types for the loader CLIs
//!
//! Wraps [`LoaderError`] with the binary name so messages can point the user at
//! the command that fixes the problem.

use depriv_common::LoaderError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// User-facing error, printed as a single `Error: ...` line
#[derive(Error, Debug)]
pub enum CliError {
    /// Nothing has been loaded at the database path yet
    #[error("Database not found at {path}. Run '{command} load' first to create the database.")]
    DatabaseNotFound { path: String, command: &'static str },

    /// Any pipeline, query or publish failure
    #[error(transparent)]
    Loader(LoaderError),

    /// Invalid flag combination or value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writing output failed
    #[error("Output failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Attach the binary name to a loader error
    pub fn from_loader(err: LoaderError, command: &'static str) -> Self {
        match err {
            LoaderError::DatabaseNotFound { path } => Self::DatabaseNotFound {
                path: path.display().to_string(),
                command,
            },
            other => Self::Loader(other),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
