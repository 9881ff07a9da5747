//! Archive fetcher
//!
//! Downloads the dataset archive once. An existing non-empty archive is reused,
//! so re-running a load never repeats a large download. Bodies are streamed to
//! `<archive>.part` and renamed into place only when complete.

use crate::config::{LoaderConfig, SourceDescriptor};
use depriv_common::{checksum, BoxError, LoaderError, Result};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The archive on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
    /// True when an existing archive was reused without network I/O
    pub cached: bool,
}

/// HTTP client for the dataset archive
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| LoaderError::download(config.dataset().slug(), &config.source().url, e))?;

        Ok(Self { client })
    }

    /// Make sure the archive for `source` exists locally
    pub fn fetch(&self, source: &SourceDescriptor) -> Result<DownloadArtifact> {
        let dataset = source.dataset.slug();
        let destination = source.archive_path();

        let (bytes, cached) = match existing_size(&destination) {
            Some(size) => {
                info!(path = %destination.display(), bytes = size, "Archive already present, skipping download");
                (size, true)
            },
            None => {
                info!(url = %source.url, path = %destination.display(), "Downloading archive");
                let size = self
                    .download(&source.url, &destination)
                    .map_err(|e| LoaderError::download(dataset, &source.url, e))?;
                info!(bytes = size, "Download complete");
                (size, false)
            },
        };

        let sha256 = checksum::compute_file_checksum(&destination)
            .map_err(|e| LoaderError::download(dataset, &source.url, e))?;

        if let Some(expected) = source.expected_sha256.as_deref() {
            if !checksum::digests_match(expected, &sha256) {
                warn!(path = %destination.display(), expected, actual = %sha256, "Checksum mismatch, discarding archive");
                // A bad archive must not be mistaken for a cached one next run
                if let Err(e) = fs::remove_file(&destination) {
                    warn!(error = %e, "Failed to remove mismatched archive");
                }
                return Err(LoaderError::ChecksumMismatch {
                    dataset,
                    path: destination,
                    expected: expected.to_string(),
                    actual: sha256,
                });
            }
            debug!("Checksum verified");
        }

        Ok(DownloadArtifact {
            path: destination,
            bytes,
            sha256,
            cached,
        })
    }

    fn download(&self, url: &str, destination: &Path) -> std::result::Result<u64, BoxError> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let partial = partial_path(destination);
        let result = self
            .stream_to(url, &partial)
            .and_then(|bytes| fs::rename(&partial, destination).map(|_| bytes).map_err(BoxError::from));

        if result.is_err() && partial.exists() {
            if let Err(e) = fs::remove_file(&partial) {
                warn!(path = %partial.display(), error = %e, "Failed to remove partial download");
            }
        }

        result
    }

    fn stream_to(&self, url: &str, partial: &Path) -> std::result::Result<u64, BoxError> {
        let mut response = self.client.get(url).send()?.error_for_status()?;

        let mut writer = BufWriter::new(File::create(partial)?);
        let bytes = response.copy_to(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        if bytes == 0 {
            return Err("server returned an empty body".into());
        }

        Ok(bytes)
    }
}

/// Size of `path` when it is a non-empty file
fn existing_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARCHIVE_BODY: &[u8] = b"PK\x03\x04 pretend archive bytes";

    fn config_for(url: String, dir: &Path) -> LoaderConfig {
        LoaderConfig::new(Dataset::Imd2025)
            .with_url(url)
            .with_data_dir(dir)
            .with_http_timeout(Duration::from_secs(5))
    }

    fn fetch_blocking(config: LoaderConfig) -> Result<DownloadArtifact> {
        Fetcher::new(&config)?.fetch(config.source())
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/data/imd.zip")),
            PathBuf::from("/data/imd.zip.part")
        );
    }

    #[test]
    fn test_existing_archive_skips_network() {
        let temp = TempDir::new().unwrap();
        // Nothing listens here; any request would fail
        let config = config_for("http://127.0.0.1:9/imd.zip".to_string(), temp.path());
        fs::write(config.source().archive_path(), ARCHIVE_BODY).unwrap();

        let artifact = fetch_blocking(config).unwrap();
        assert!(artifact.cached);
        assert_eq!(artifact.bytes, ARCHIVE_BODY.len() as u64);
        assert_eq!(artifact.sha256.len(), 64);
    }

    #[test]
    fn test_empty_archive_is_not_reused() {
        let temp = TempDir::new().unwrap();
        let config = config_for("http://127.0.0.1:9/imd.zip".to_string(), temp.path());
        fs::write(config.source().archive_path(), b"").unwrap();

        let err = fetch_blocking(config).unwrap_err();
        assert!(matches!(err, LoaderError::Download { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_fetch_does_not_hit_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/imd.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(ARCHIVE_BODY))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let config = config_for(format!("{}/imd.zip", server.uri()), temp.path());

        let first = {
            let config = config.clone();
            tokio::task::spawn_blocking(move || fetch_blocking(config))
                .await
                .unwrap()
                .unwrap()
        };
        let second = tokio::task::spawn_blocking(move || fetch_blocking(config))
            .await
            .unwrap()
            .unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.sha256, second.sha256);
        assert_eq!(fs::read(&first.path).unwrap(), ARCHIVE_BODY);
        assert!(!partial_path(&first.path).exists());
        // expect(1) is verified when the server drops
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_http_error_leaves_no_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let config = config_for(format!("{}/missing.zip", server.uri()), temp.path());
        let archive = config.source().archive_path();

        let err = tokio::task::spawn_blocking(move || fetch_blocking(config))
            .await
            .unwrap()
            .unwrap_err();

        match err {
            LoaderError::Download { url, dataset, .. } => {
                assert!(url.ends_with("/missing.zip"));
                assert_eq!(dataset, "imd2025");
            },
            other => panic!("expected download error, got {other:?}"),
        }
        assert!(!archive.exists());
        assert!(!partial_path(&archive).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_checksum_mismatch_discards_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(ARCHIVE_BODY))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let config = config_for(format!("{}/imd.zip", server.uri()), temp.path())
            .with_expected_sha256("0".repeat(64));
        let archive = config.source().archive_path();

        let err = tokio::task::spawn_blocking(move || fetch_blocking(config))
            .await
            .unwrap()
            .unwrap_err();

        assert!(matches!(err, LoaderError::ChecksumMismatch { .. }));
        assert!(!archive.exists());
    }
}
