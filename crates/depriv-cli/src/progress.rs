//! Terminal rendering of pipeline progress
//!
//! [`ProgressRenderer`] turns [`ProgressEvent`]s into indicatif spinners and a
//! table bar. `--json` bypasses it and prints the events themselves.

use colored::Colorize;
use depriv_ingest::ProgressEvent;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";
const TABLES_TEMPLATE: &str = "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} tables";

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a bar counting loaded tables
pub fn create_table_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(TABLES_TEMPLATE) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Draws one active indicator at a time
#[derive(Default)]
pub struct ProgressRenderer {
    active: Option<ProgressBar>,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { dataset, db_path, .. } => {
                println!("{} {} into {}", "Loading".cyan().bold(), dataset, db_path.display());
            },
            ProgressEvent::DownloadStarted { url, .. } => {
                self.replace(create_spinner(&format!("Downloading {}", url)));
            },
            ProgressEvent::Downloaded { bytes, cached, .. } => {
                let note = if *cached { " (cached)" } else { "" };
                self.finish(format!("{} Archive ready, {}{}", "✓".green(), format_bytes(*bytes), note));
            },
            ProgressEvent::ExtractStarted { .. } => {
                self.replace(create_spinner("Extracting archive"));
            },
            ProgressEvent::Extracted { files, reused } => {
                let note = if *reused { " (reused)" } else { "" };
                self.finish(format!("{} Found {} data files{}", "✓".green(), files, note));
            },
            ProgressEvent::LoadStarted { files, .. } => {
                self.replace(create_table_bar(*files as u64, "Loading tables"));
            },
            ProgressEvent::TableLoaded { schema, table, rows, .. } => {
                if let Some(ref pb) = self.active {
                    pb.set_message(format!("Loaded {}.{} ({} rows)", schema, table, rows));
                    pb.inc(1);
                }
            },
            ProgressEvent::Loaded { tables } => {
                self.finish(format!("{} Loaded {} tables", "✓".green(), tables));
            },
            ProgressEvent::Complete { total_tables, db_path } => {
                println!(
                    "{} {} tables in {}",
                    "Done:".green().bold(),
                    total_tables,
                    db_path.display()
                );
            },
            ProgressEvent::Failed { stage, .. } => {
                if let Some(pb) = self.active.take() {
                    pb.abandon_with_message(format!("{} {} failed", "✗".red(), stage));
                }
            },
        }
    }

    fn replace(&mut self, pb: ProgressBar) {
        if let Some(old) = self.active.replace(pb) {
            old.finish_and_clear();
        }
    }

    fn finish(&mut self, message: String) {
        match self.active.take() {
            Some(pb) => pb.finish_with_message(message),
            None => println!("{}", message),
        }
    }
}
