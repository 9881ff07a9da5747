//! `<cmd> load` command implementation
//!
//! Downloads, extracts and loads the release, then optionally publishes the
//! finished database to MotherDuck.

use super::ForCommand;
use crate::error::{CliError, Result};
use crate::progress::ProgressRenderer;
use anyhow::Context;
use clap::Args;
use colored::Colorize;
use depriv_ingest::publish::{self, validate_remote_name, PublishTarget};
use depriv_ingest::{drain, Dataset, LoadSummary, LoaderConfig, Pipeline, ProgressEvent};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{info, warn};

/// Flags of the `load` subcommand
#[derive(Args, Debug, Default, Clone)]
pub struct LoadArgs {
    /// Directory to store downloaded files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Path to the DuckDB database
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Archive URL to download instead of the published release
    #[arg(long)]
    pub source_url: Option<String>,

    /// Print progress as JSON lines instead of progress bars
    #[arg(long)]
    pub json: bool,

    /// Push the database to MotherDuck after the local load completes
    #[arg(long)]
    pub motherduck: bool,

    /// Name for the MotherDuck database (defaults to the dataset slug)
    #[arg(long, requires = "motherduck")]
    pub motherduck_db: Option<String>,

    /// MotherDuck token (falls back to $motherduck_token)
    #[arg(long, requires = "motherduck")]
    pub motherduck_token: Option<String>,
}

impl LoadArgs {
    /// Environment first, then these flags on top
    pub fn loader_config(&self, dataset: Dataset) -> Result<LoaderConfig> {
        let mut config = LoaderConfig::from_env(dataset).for_command(dataset)?;

        if let Some(ref dir) = self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(ref path) = self.db_path {
            config = config.with_db_path(path);
        }
        if let Some(ref url) = self.source_url {
            config = config.with_url(url);
        }

        config.validate().for_command(dataset)?;
        Ok(config)
    }

    fn remote_name(&self, dataset: Dataset) -> String {
        self.motherduck_db
            .clone()
            .unwrap_or_else(|| dataset.default_remote_name().to_string())
    }
}

pub fn run(dataset: Dataset, args: &LoadArgs) -> Result<()> {
    let config = args.loader_config(dataset)?;

    // Reject a bad remote name before spending time on the download
    if args.motherduck {
        validate_remote_name(&args.remote_name(dataset)).map_err(CliError::config)?;
    }

    info!(dataset = %dataset, db = %config.db_path().display(), "Running load");
    let pipeline = Pipeline::new(config);

    let summary = if args.json {
        emit_json(pipeline)
    } else {
        let mut renderer = ProgressRenderer::new();
        drain(pipeline, |event| renderer.render(event))
    }
    .for_command(dataset)?;

    if args.motherduck {
        push(dataset, args, &summary)?;
    }

    Ok(())
}

fn emit_json(pipeline: Pipeline) -> depriv_ingest::Result<LoadSummary> {
    let mut stdout = io::stdout().lock();
    drain(pipeline, |event: &ProgressEvent| {
        let written = event
            .to_json_line()
            .map_err(io::Error::from)
            .and_then(|line| writeln!(stdout, "{}", line));
        if let Err(e) = written {
            warn!(error = %e, "Failed to write progress event");
        }
    })
}

fn push(dataset: Dataset, args: &LoadArgs, summary: &LoadSummary) -> Result<()> {
    let remote = args.remote_name(dataset);
    let target = PublishTarget::new(remote.as_str(), args.motherduck_token.as_deref());

    if !args.json {
        println!();
        println!("Pushing database to MotherDuck...");
    }

    publish::publish(dataset, &summary.db_path, &target).for_command(dataset)?;

    if args.json {
        let line = serde_json::to_string(&serde_json::json!({
            "stage": "publish",
            "event": "published",
            "remote": remote,
        }))
        .context("Failed to encode publish event")?;
        println!("{}", line);
    } else {
        println!("{} Database uploaded to MotherDuck as '{}'", "✓".green(), remote);
        println!("  Connect with: duckdb -c 'ATTACH \"md:{}\"'", remote);
    }

    Ok(())
}
