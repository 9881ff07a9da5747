//! Loader configuration
//!
//! A [`LoaderConfig`] is built once (defaults, then environment, then explicit
//! overrides) and handed to the pipeline by value. Nothing here is global.

use crate::dataset::Dataset;
use depriv_common::{LoaderError, Result};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

/// Sub-directory of the data directory holding unpacked archive contents
pub const EXTRACT_DIR_NAME: &str = "extracted";

fn default_base_dir(dataset: Dataset) -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("depriv"))
        .unwrap_or_else(|| PathBuf::from(".depriv"))
        .join(dataset.slug())
}

/// Default directory for the downloaded archive and its extracted files
pub fn default_data_dir(dataset: Dataset) -> PathBuf {
    default_base_dir(dataset).join("data")
}

/// Default location of the DuckDB database file
pub fn default_db_path(dataset: Dataset) -> PathBuf {
    default_base_dir(dataset).join(format!("{}.duckdb", dataset.slug()))
}

/// Where one dataset comes from and where it lands locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub dataset: Dataset,
    pub url: String,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Optional hex SHA-256 the downloaded archive must match
    pub expected_sha256: Option<String>,
}

impl SourceDescriptor {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            url: dataset.default_url().to_string(),
            data_dir: default_data_dir(dataset),
            db_path: default_db_path(dataset),
            expected_sha256: None,
        }
    }

    /// File name of the archive: last URL path segment, or `<slug>.zip`
    pub fn archive_name(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("{}.zip", self.dataset.slug()))
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(self.archive_name())
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.data_dir.join(EXTRACT_DIR_NAME)
    }
}

/// Immutable configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    source: SourceDescriptor,
    http_timeout: Duration,
    user_agent: String,
}

impl LoaderConfig {
    /// Built-in defaults for `dataset`
    pub fn new(dataset: Dataset) -> Self {
        Self {
            source: SourceDescriptor::new(dataset),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            user_agent: format!(
                "depriv-{}/{}",
                dataset.command_name(),
                env!("CARGO_PKG_VERSION")
            ),
        }
    }

    /// Defaults overridden by the dataset's environment variables
    ///
    /// With prefix `IMD_` (or `IOD_`):
    /// - `IMD_DATA_DIR`: download and extraction directory
    /// - `IMD_DB_PATH`: DuckDB database file
    /// - `IMD_SOURCE_URL`: archive URL
    /// - `IMD_SHA256`: expected archive checksum
    /// - `IMD_HTTP_TIMEOUT_SECS`: HTTP timeout in seconds
    pub fn from_env(dataset: Dataset) -> Result<Self> {
        let prefix = dataset.env_prefix();
        let var = |name: &str| std::env::var(format!("{}{}", prefix, name)).ok();

        let mut config = Self::new(dataset);

        if let Some(dir) = var("DATA_DIR") {
            config = config.with_data_dir(dir);
        }

        if let Some(path) = var("DB_PATH") {
            config = config.with_db_path(path);
        }

        if let Some(url) = var("SOURCE_URL") {
            config = config.with_url(url);
        }

        if let Some(sha) = var("SHA256") {
            config = config.with_expected_sha256(sha);
        }

        if let Some(secs) = var("HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                LoaderError::config(format!("{}HTTP_TIMEOUT_SECS must be a whole number of seconds, got '{}'", prefix, secs))
            })?;
            config = config.with_http_timeout(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source.data_dir = dir.into();
        self
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source.db_path = path.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.source.url = url.into();
        self
    }

    pub fn with_expected_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.source.expected_sha256 = Some(sha256.into());
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Check the URL and timeout before anything touches the network
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.source.url).map_err(|e| {
            LoaderError::config(format!("invalid source URL '{}': {}", self.source.url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(LoaderError::config(format!(
                "source URL must be http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.http_timeout.is_zero() {
            return Err(LoaderError::config("HTTP timeout must be greater than zero"));
        }

        Ok(())
    }

    pub fn dataset(&self) -> Dataset {
        self.source.dataset
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    pub fn db_path(&self) -> &Path {
        &self.source.db_path
    }

    pub fn data_dir(&self) -> &Path {
        &self.source.data_dir
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::new(Dataset::Imd2025);
        assert_eq!(config.source().url, Dataset::Imd2025.default_url());
        assert!(config.db_path().ends_with("imd2025/imd2025.duckdb"));
        assert!(config.data_dir().ends_with("imd2025/data"));
        assert_eq!(config.http_timeout(), Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        assert!(config.user_agent().starts_with("depriv-imd/"));
        config.validate().unwrap();
    }

    #[test]
    fn test_archive_name_from_url() {
        let source = LoaderConfig::new(Dataset::Iod2025)
            .with_url("https://example.com/files/IoD2025.zip?download=1")
            .with_data_dir("/data")
            .source()
            .clone();
        assert_eq!(source.archive_name(), "IoD2025.zip");
        assert_eq!(source.archive_path(), PathBuf::from("/data/IoD2025.zip"));
        assert_eq!(source.extract_dir(), PathBuf::from("/data/extracted"));
    }

    #[test]
    fn test_archive_name_falls_back_to_slug() {
        let source = LoaderConfig::new(Dataset::Iod2025)
            .with_url("https://example.com/")
            .source()
            .clone();
        assert_eq!(source.archive_name(), "iod2025.zip");
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let config = LoaderConfig::new(Dataset::Imd2025).with_url("not a url");
        assert!(matches!(config.validate(), Err(LoaderError::Config(_))));

        let config = LoaderConfig::new(Dataset::Imd2025).with_url("ftp://example.com/imd.zip");
        assert!(config.validate().is_err());

        let config = LoaderConfig::new(Dataset::Imd2025).with_http_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("IOD_DB_PATH", "/tmp/iod-test.duckdb");
        std::env::set_var("IOD_SOURCE_URL", "http://localhost:9999/iod.zip");
        std::env::set_var("IOD_HTTP_TIMEOUT_SECS", "15");

        let config = LoaderConfig::from_env(Dataset::Iod2025).unwrap();
        assert_eq!(config.db_path(), Path::new("/tmp/iod-test.duckdb"));
        assert_eq!(config.source().url, "http://localhost:9999/iod.zip");
        assert_eq!(config.http_timeout(), Duration::from_secs(15));

        // The other dataset is unaffected
        let imd = LoaderConfig::from_env(Dataset::Imd2025).unwrap();
        assert_eq!(imd.source().url, Dataset::Imd2025.default_url());

        std::env::remove_var("IOD_DB_PATH");
        std::env::remove_var("IOD_SOURCE_URL");
        std::env::remove_var("IOD_HTTP_TIMEOUT_SECS");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_timeout() {
        std::env::set_var("IMD_HTTP_TIMEOUT_SECS", "soon");
        let result = LoaderConfig::from_env(Dataset::Imd2025);
        std::env::remove_var("IMD_HTTP_TIMEOUT_SECS");

        assert!(matches!(result, Err(LoaderError::Config(_))));
    }
}
