//! Depriv Ingest Library
//!
//! Fetch, unpack and load the English Indices of Deprivation 2025 releases
//! into a local DuckDB database.
//!
//! # Supported Datasets
//!
//! - **IMD 2025**: Index of Multiple Deprivation files (`imd`)
//! - **IoD 2025**: Indices of Deprivation domains and supplementary indices (`iod`)
//!
//! # Stages
//!
//! 1. [`fetch`]: download the release archive, skipping it when already present
//! 2. [`extract`]: unpack the archive and find its tabular files
//! 3. [`schema`] + [`load`]: map each file to `schema.table` and load all of
//!    them in one transaction
//! 4. [`publish`] (optional): copy the database to MotherDuck
//!
//! [`pipeline::Pipeline`] drives stages 1-3 one event at a time. [`query`]
//! reads the result back.
//!
//! # Example
//!
//! ```no_run
//! use depriv_ingest::{Dataset, LoaderConfig};
//!
//! fn main() -> depriv_ingest::Result<()> {
//!     let config = LoaderConfig::from_env(Dataset::Iod2025)?;
//!     let summary = depriv_ingest::load(config, |event| println!("{:?}", event))?;
//!     println!("{} tables in {}", summary.tables.len(), summary.db_path.display());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod dataset;
pub mod extract;
pub mod fetch;
pub mod load;
pub mod pipeline;
pub mod publish;
pub mod query;
pub mod schema;

pub use config::{LoaderConfig, SourceDescriptor};
pub use dataset::Dataset;
pub use depriv_common::{LoaderError, Result, Stage};
pub use pipeline::{drain, LoadSummary, Pipeline, ProgressEvent};
pub use publish::PublishTarget;
pub use query::{Database, QueryResult};
pub use schema::TableTarget;

/// Run the whole pipeline for `config`, reporting each event to `on_event`
pub fn load<F>(config: LoaderConfig, on_event: F) -> Result<LoadSummary>
where
    F: FnMut(&ProgressEvent),
{
    drain(Pipeline::new(config), on_event)
}
