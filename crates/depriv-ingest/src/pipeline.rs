//! Staged ingestion pipeline
//!
//! [`Pipeline`] is a lazy iterator of [`ProgressEvent`]s. Each call to `next()`
//! performs at most one unit of work (the download, the extraction, or one
//! table) on the caller's thread, then reports it. Nothing runs ahead of the
//! consumer and nothing runs in the background.
//!
//! A successful run yields:
//!
//! ```text
//! Started
//! DownloadStarted -> Downloaded
//! ExtractStarted  -> Extracted
//! LoadStarted     -> TableLoaded x N -> Loaded
//! Complete
//! ```
//!
//! The first stage error is reported as a single `Failed` event, after which
//! the iterator is exhausted.
//!
//! # Example
//!
//! ```no_run
//! use depriv_ingest::{Dataset, LoaderConfig, Pipeline, ProgressEvent};
//!
//! for event in Pipeline::new(LoaderConfig::new(Dataset::Imd2025)) {
//!     if let ProgressEvent::Complete { total_tables, .. } = event {
//!         println!("Loaded {} tables", total_tables);
//!     }
//! }
//! ```

use crate::config::LoaderConfig;
use crate::extract::{self, Extraction};
use crate::fetch::{DownloadArtifact, Fetcher};
use crate::load::Loader;
use crate::schema::{self, PlannedTable, TableTarget};
use depriv_common::{LoaderError, Result, Stage};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::vec::IntoIter;
use tracing::{debug, error, info};

/// One step of pipeline progress
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        dataset: &'static str,
        url: String,
        db_path: PathBuf,
    },
    DownloadStarted {
        url: String,
        destination: PathBuf,
    },
    Downloaded {
        path: PathBuf,
        bytes: u64,
        sha256: String,
        cached: bool,
    },
    ExtractStarted {
        archive: PathBuf,
        destination: PathBuf,
    },
    Extracted {
        files: usize,
        reused: bool,
    },
    LoadStarted {
        files: usize,
        db_path: PathBuf,
    },
    TableLoaded {
        schema: String,
        table: String,
        rows: u64,
        /// 1-based position of this table in the run
        index: usize,
        total: usize,
    },
    Loaded {
        tables: usize,
    },
    Complete {
        total_tables: usize,
        db_path: PathBuf,
    },
    Failed {
        /// Stage that failed
        #[serde(rename = "failed_stage")]
        stage: Stage,
        #[serde(serialize_with = "serialize_display")]
        error: LoaderError,
    },
}

impl ProgressEvent {
    pub fn stage(&self) -> Stage {
        match self {
            ProgressEvent::Started { .. } => Stage::Start,
            ProgressEvent::DownloadStarted { .. } | ProgressEvent::Downloaded { .. } => {
                Stage::Download
            },
            ProgressEvent::ExtractStarted { .. } | ProgressEvent::Extracted { .. } => {
                Stage::Extract
            },
            ProgressEvent::LoadStarted { .. }
            | ProgressEvent::TableLoaded { .. }
            | ProgressEvent::Loaded { .. } => Stage::Load,
            ProgressEvent::Complete { .. } => Stage::Complete,
            ProgressEvent::Failed { .. } => Stage::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Failed { .. })
    }

    /// One-line JSON with a top-level `stage` field
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Record<'a> {
            stage: Stage,
            #[serde(flatten)]
            event: &'a ProgressEvent,
        }

        serde_json::to_string(&Record {
            stage: self.stage(),
            event: self,
        })
    }
}

fn serialize_display<S: Serializer>(error: &LoaderError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Outcome of a fully drained pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub tables: Vec<TableTarget>,
    pub db_path: PathBuf,
}

enum State {
    Start,
    BeginDownload,
    Download,
    BeginExtract(DownloadArtifact),
    Extract(DownloadArtifact),
    BeginLoad(Extraction),
    Loading {
        loader: Loader,
        pending: IntoIter<PlannedTable>,
        loaded: usize,
        total: usize,
    },
    Finish {
        tables: usize,
    },
    Done,
}

/// Lazy, single-use driver of fetch, extract and load
pub struct Pipeline {
    config: LoaderConfig,
    state: State,
}

impl Pipeline {
    /// Nothing happens until the first call to `next()`
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            state: State::Start,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn dataset(&self) -> &'static str {
        self.config.dataset().slug()
    }

    fn advance(&self, state: State) -> std::result::Result<(ProgressEvent, State), (Stage, LoaderError)> {
        let source = self.config.source();

        match state {
            State::Start => {
                info!(dataset = self.dataset(), url = %source.url, db = %source.db_path.display(), "Starting load");
                Ok((
                    ProgressEvent::Started {
                        dataset: self.dataset(),
                        url: source.url.clone(),
                        db_path: source.db_path.clone(),
                    },
                    State::BeginDownload,
                ))
            },

            State::BeginDownload => Ok((
                ProgressEvent::DownloadStarted {
                    url: source.url.clone(),
                    destination: source.archive_path(),
                },
                State::Download,
            )),

            State::Download => {
                let artifact = Fetcher::new(&self.config)
                    .and_then(|fetcher| fetcher.fetch(source))
                    .map_err(|e| (Stage::Download, e))?;
                Ok((
                    ProgressEvent::Downloaded {
                        path: artifact.path.clone(),
                        bytes: artifact.bytes,
                        sha256: artifact.sha256.clone(),
                        cached: artifact.cached,
                    },
                    State::BeginExtract(artifact),
                ))
            },

            State::BeginExtract(artifact) => Ok((
                ProgressEvent::ExtractStarted {
                    archive: artifact.path.clone(),
                    destination: source.extract_dir(),
                },
                State::Extract(artifact),
            )),

            State::Extract(artifact) => {
                let extraction = extract::extract(
                    self.dataset(),
                    &artifact.path,
                    &artifact.sha256,
                    &source.extract_dir(),
                )
                .map_err(|e| (Stage::Extract, e))?;
                Ok((
                    ProgressEvent::Extracted {
                        files: extraction.files.len(),
                        reused: extraction.reused,
                    },
                    State::BeginLoad(extraction),
                ))
            },

            State::BeginLoad(extraction) => {
                let plan = self.prepare_load(&extraction).map_err(|e| (Stage::Load, e))?;
                let total = plan.len();
                let mut loader =
                    Loader::open(self.dataset(), &source.db_path).map_err(|e| (Stage::Load, e))?;
                loader.begin().map_err(|e| (Stage::Load, e))?;

                Ok((
                    ProgressEvent::LoadStarted {
                        files: total,
                        db_path: source.db_path.clone(),
                    },
                    State::Loading {
                        loader,
                        pending: plan.into_iter(),
                        loaded: 0,
                        total,
                    },
                ))
            },

            State::Loading {
                mut loader,
                mut pending,
                loaded,
                total,
            } => match pending.next() {
                Some(planned) => {
                    // A failure drops `loader`, which rolls the transaction back
                    let rows = loader.load_table(&planned).map_err(|e| (Stage::Load, e))?;
                    let index = loaded + 1;
                    Ok((
                        ProgressEvent::TableLoaded {
                            schema: planned.target.schema,
                            table: planned.target.table,
                            rows,
                            index,
                            total,
                        },
                        State::Loading {
                            loader,
                            pending,
                            loaded: index,
                            total,
                        },
                    ))
                },
                None => {
                    loader.commit().map_err(|e| (Stage::Load, e))?;
                    Ok((ProgressEvent::Loaded { tables: loaded }, State::Finish { tables: loaded }))
                },
            },

            State::Finish { tables } => {
                info!(tables, db = %source.db_path.display(), "Load complete");
                Ok((
                    ProgressEvent::Complete {
                        total_tables: tables,
                        db_path: source.db_path.clone(),
                    },
                    State::Done,
                ))
            },

            // Handled by `next`
            State::Done => Err((
                Stage::Error,
                LoaderError::config("pipeline already finished"),
            )),
        }
    }

    fn prepare_load(&self, extraction: &Extraction) -> Result<Vec<PlannedTable>> {
        if extraction.files.is_empty() {
            return Err(LoaderError::NoTables {
                dataset: self.dataset(),
                dir: self.config.source().extract_dir(),
            });
        }

        let plan = schema::plan_targets(self.dataset(), &extraction.files, self.dataset())?;
        debug!(tables = plan.len(), "Planned destination tables");
        Ok(plan)
    }
}

impl Iterator for Pipeline {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        let state = std::mem::replace(&mut self.state, State::Done);
        if matches!(state, State::Done) {
            return None;
        }

        match self.advance(state) {
            Ok((event, next)) => {
                self.state = next;
                Some(event)
            },
            Err((stage, error)) => {
                error!(%stage, error = %error, "Pipeline stage failed");
                Some(ProgressEvent::Failed { stage, error })
            },
        }
    }
}

impl std::iter::FusedIterator for Pipeline {}

/// Run `pipeline` to the end, handing every event to `on_event`
pub fn drain<F>(pipeline: Pipeline, mut on_event: F) -> Result<LoadSummary>
where
    F: FnMut(&ProgressEvent),
{
    let mut tables = Vec::new();

    for event in pipeline {
        on_event(&event);
        match event {
            ProgressEvent::TableLoaded { schema, table, .. } => {
                tables.push(TableTarget { schema, table });
            },
            ProgressEvent::Complete { db_path, .. } => {
                return Ok(LoadSummary { tables, db_path });
            },
            ProgressEvent::Failed { error, .. } => return Err(error),
            _ => {},
        }
    }

    Err(LoaderError::config("pipeline ended without a terminal event"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    #[test]
    fn test_event_stages() {
        let event = ProgressEvent::TableLoaded {
            schema: "scores".into(),
            table: "income".into(),
            rows: 10,
            index: 1,
            total: 2,
        };
        assert_eq!(event.stage(), Stage::Load);
        assert!(!event.is_terminal());

        let failed = ProgressEvent::Failed {
            stage: Stage::Extract,
            error: LoaderError::extraction("imd2025", "/tmp/x.zip", "truncated"),
        };
        assert_eq!(failed.stage(), Stage::Error);
        assert!(failed.is_terminal());
    }

    #[test]
    fn test_json_line_has_stage_and_event() {
        let line = ProgressEvent::Loaded { tables: 3 }.to_json_line().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["stage"], "load");
        assert_eq!(value["event"], "loaded");
        assert_eq!(value["tables"], 3);

        let failed = ProgressEvent::Failed {
            stage: Stage::Download,
            error: LoaderError::download("iod2025", "http://x/iod.zip", "connection reset"),
        };
        let value: serde_json::Value = serde_json::from_str(&failed.to_json_line().unwrap()).unwrap();
        assert_eq!(value["stage"], "error");
        assert_eq!(value["failed_stage"], "download");
        assert!(value["error"].as_str().unwrap().contains("connection reset"));
    }

    #[test]
    fn test_pipeline_is_lazy() {
        // Unreachable source: constructing the pipeline must not touch it
        let config = LoaderConfig::new(Dataset::Imd2025).with_url("http://127.0.0.1:9/never.zip");
        let mut pipeline = Pipeline::new(config);

        let first = pipeline.next().unwrap();
        assert_eq!(first.stage(), Stage::Start);
    }
}
