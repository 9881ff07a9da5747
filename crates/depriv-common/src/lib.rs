//! Depriv Common Library
//!
//! Shared error handling, logging and checksum utilities for the deprivation
//! dataset loaders.
//!
//! # Overview
//!
//! - **Error Handling**: one [`LoaderError`] shared by the `imd` and `iod` loaders,
//!   tagged with the dataset it came from
//! - **Stages**: the [`Stage`] vocabulary used by progress events and errors
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Checksums**: SHA-256 helpers for verifying downloaded archives
//!
//! # Example
//!
//! ```no_run
//! use depriv_common::{checksum, Result};
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let digest = checksum::compute_file_checksum(path)?;
//!     println!("archive sha256: {}", digest);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{BoxError, LoaderError, Result, Stage};
