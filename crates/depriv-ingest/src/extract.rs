//! Archive extraction
//!
//! # Supported Formats
//!
//! - **Zip** (.zip): using the zip crate
//! - **Tar.gz** (.tar.gz, .tgz): flate2 + tar
//!
//! Extraction always starts from an empty output directory so stale files from
//! an older archive can never be loaded. A marker file records the SHA-256 of
//! the archive the directory was produced from along with every file it
//! unpacked; when the digest still matches and none of those files are
//! missing, the unpack is skipped and the file set is rebuilt by scanning the
//! directory.

use depriv_common::{BoxError, LoaderError, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Marker written into the output directory after a complete extraction
pub const MARKER_FILE: &str = ".extracted";

/// Extensions treated as loadable tabular files
pub const TABULAR_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// One tabular file produced by extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Absolute location on disk
    pub path: PathBuf,
    /// Location inside the archive
    pub relative: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    /// Tabular files, sorted by relative path
    pub files: Vec<ExtractedFile>,
    /// True when a previous extraction was reused
    pub reused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    fn detect(archive: &Path) -> Option<Self> {
        let name = archive.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// Unpack `archive` into `out_dir` and list the tabular files it contained
///
/// `archive_sha256` is the digest computed when the archive was fetched. A
/// previous extraction is reused only when its marker carries the same digest
/// and every entry it lists is still on disk.
pub fn extract(
    dataset: &'static str,
    archive: &Path,
    archive_sha256: &str,
    out_dir: &Path,
) -> Result<Extraction> {
    let fail = |source: BoxError| LoaderError::extraction(dataset, archive, source);

    let format = ArchiveFormat::detect(archive)
        .ok_or_else(|| fail("unsupported archive format (expected .zip, .tar.gz or .tgz)".into()))?;

    if let Some(previous) = Marker::read(out_dir) {
        if previous.matches(archive_sha256) && previous.is_intact(out_dir) {
            let files = scan_tabular_files(out_dir).map_err(fail)?;
            info!(dir = %out_dir.display(), files = files.len(), "Reusing previous extraction");
            return Ok(Extraction { files, reused: true });
        }
        debug!(dir = %out_dir.display(), "Previous extraction is stale");
    }

    if out_dir.exists() {
        debug!(dir = %out_dir.display(), "Clearing previous extraction");
        fs::remove_dir_all(out_dir).map_err(|e| fail(e.into()))?;
    }
    fs::create_dir_all(out_dir).map_err(|e| fail(e.into()))?;

    info!(archive = %archive.display(), dir = %out_dir.display(), ?format, "Extracting archive");
    let entries = match format {
        ArchiveFormat::Zip => unpack_zip(archive, out_dir),
        ArchiveFormat::TarGz => unpack_tar_gz(archive, out_dir),
    }
    .map_err(fail)?;

    let marker = Marker {
        sha256: archive_sha256.to_ascii_lowercase(),
        entries,
    };
    marker.write(out_dir).map_err(|e| fail(e.into()))?;

    let files = scan_tabular_files(out_dir).map_err(fail)?;
    info!(entries = marker.entries.len(), tabular = files.len(), "Extraction complete");

    Ok(Extraction {
        files,
        reused: false,
    })
}

/// Contents of [`MARKER_FILE`]: the archive digest, then one extracted
/// file per line
#[derive(Debug, Clone, PartialEq, Eq)]
struct Marker {
    sha256: String,
    entries: Vec<PathBuf>,
}

impl Marker {
    const DIGEST_PREFIX: &'static str = "sha256:";

    fn read(out_dir: &Path) -> Option<Self> {
        let text = fs::read_to_string(out_dir.join(MARKER_FILE)).ok()?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let sha256 = lines.next()?.strip_prefix(Self::DIGEST_PREFIX)?.to_string();
        if sha256.is_empty() {
            return None;
        }
        let entries = lines.filter(|l| !l.is_empty()).map(PathBuf::from).collect();
        Some(Self { sha256, entries })
    }

    fn render(&self) -> String {
        let mut text = format!("{}{}\n", Self::DIGEST_PREFIX, self.sha256);
        for entry in &self.entries {
            text.push_str(&entry.to_string_lossy());
            text.push('\n');
        }
        text
    }

    fn write(&self, out_dir: &Path) -> io::Result<()> {
        fs::write(out_dir.join(MARKER_FILE), self.render())
    }

    fn matches(&self, archive_sha256: &str) -> bool {
        self.sha256.eq_ignore_ascii_case(archive_sha256)
    }

    fn is_intact(&self, out_dir: &Path) -> bool {
        self.entries.iter().all(|entry| out_dir.join(entry).is_file())
    }
}

/// Files written, relative to `out_dir`
fn unpack_zip(archive: &Path, out_dir: &Path) -> std::result::Result<Vec<PathBuf>, BoxError> {
    let mut zip = zip::ZipArchive::new(BufReader::new(File::open(archive)?))?;
    let mut written = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| format!("entry '{}' escapes the output directory", entry.name()))?;
        let target = out_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        debug!(path = %target.display(), bytes = entry.size(), "Extracted entry");
        written.push(relative);
    }

    Ok(written)
}

fn unpack_tar_gz(archive: &Path, out_dir: &Path) -> std::result::Result<Vec<PathBuf>, BoxError> {
    let decoder = GzDecoder::new(BufReader::new(File::open(archive)?));
    let mut tar = tar::Archive::new(decoder);
    let mut written = Vec::new();

    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if !entry.unpack_in(out_dir)? {
            return Err(format!("entry '{}' escapes the output directory", path.display()).into());
        }
        if entry.header().entry_type().is_file() {
            written.push(path);
        }
    }

    Ok(written)
}

pub fn is_tabular(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TABULAR_EXTENSIONS.iter().any(|t| ext.eq_ignore_ascii_case(t)))
        .unwrap_or(false)
}

/// List tabular files under `dir`, sorted by their path relative to it
pub fn scan_tabular_files(dir: &Path) -> std::result::Result<Vec<ExtractedFile>, BoxError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_tabular(entry.path()) {
            continue;
        }
        let relative = entry.path().strip_prefix(dir)?.to_path_buf();
        files.push(ExtractedFile {
            path: entry.path().to_path_buf(),
            relative,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use depriv_common::checksum::compute_file_checksum;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, contents) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn sha256(path: &Path) -> String {
        compute_file_checksum(path).unwrap()
    }

    /// Extract with the digest the fetch stage would have recorded
    fn extract_fixture(archive: &Path, out: &Path) -> Result<Extraction> {
        extract("imd2025", archive, &sha256(archive), out)
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(ArchiveFormat::detect(Path::new("a/IMD.ZIP")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect(Path::new("b.tar.gz")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect(Path::new("c.tgz")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect(Path::new("d.rar")), None);
    }

    #[test]
    fn test_extract_zip_preserves_nested_paths() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("imd.zip");
        write_zip(
            &archive,
            &[
                ("scores/Income.csv", "lsoa,score\nE01000001,0.1\n"),
                ("ranks/deep/Health.tsv", "lsoa\trank\nE01000001\t5\n"),
                ("README.pdf", "%PDF"),
            ],
        );

        let out = temp.path().join("extracted");
        let extraction = extract_fixture(&archive, &out).unwrap();

        assert!(!extraction.reused);
        let relative: Vec<_> = extraction.files.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("ranks/deep/Health.tsv"),
                PathBuf::from("scores/Income.csv"),
            ]
        );
        assert!(out.join("README.pdf").exists());
        assert!(extraction.files.iter().all(|f| f.path.starts_with(&out)));
    }

    #[test]
    fn test_reextraction_reuses_marker_and_clears_stale_files() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("imd.zip");
        write_zip(&archive, &[("a.csv", "x\n1\n")]);
        let out = temp.path().join("extracted");

        extract_fixture(&archive, &out).unwrap();
        let again = extract_fixture(&archive, &out).unwrap();
        assert!(again.reused);
        assert_eq!(again.files.len(), 1);

        // A different archive invalidates the marker and wipes old contents
        write_zip(&archive, &[("b.csv", "y\n2\n"), ("c.csv", "z\n3\n")]);
        let fresh = extract_fixture(&archive, &out).unwrap();
        assert!(!fresh.reused);
        let names: Vec<_> = fresh.files.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("b.csv"), PathBuf::from("c.csv")]);
        assert!(!out.join("a.csv").exists());
    }

    #[test]
    fn test_same_size_archive_with_new_contents_is_reextracted() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("imd.zip");
        let out = temp.path().join("extracted");

        write_zip(&archive, &[("a.csv", "x\n1\n")]);
        let size_before = fs::metadata(&archive).unwrap().len();
        extract_fixture(&archive, &out).unwrap();

        write_zip(&archive, &[("b.csv", "y\n2\n")]);
        assert_eq!(fs::metadata(&archive).unwrap().len(), size_before);

        let fresh = extract_fixture(&archive, &out).unwrap();
        assert!(!fresh.reused);
        let names: Vec<_> = fresh.files.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("b.csv")]);
        assert!(!out.join("a.csv").exists());
    }

    #[test]
    fn test_missing_extracted_file_forces_reextraction() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("imd.zip");
        let out = temp.path().join("extracted");
        write_zip(&archive, &[("a.csv", "x\n1\n"), ("nested/b.csv", "y\n2\n")]);

        extract_fixture(&archive, &out).unwrap();
        fs::remove_file(out.join("nested/b.csv")).unwrap();

        let again = extract_fixture(&archive, &out).unwrap();
        assert!(!again.reused);
        assert_eq!(again.files.len(), 2);
        assert!(out.join("nested/b.csv").exists());
    }

    #[test]
    fn test_marker_records_digest_and_entries() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("imd.zip");
        let out = temp.path().join("extracted");
        write_zip(&archive, &[("scores/Income.csv", "a\n1\n"), ("README.pdf", "%PDF")]);

        extract_fixture(&archive, &out).unwrap();

        let marker = Marker::read(&out).unwrap();
        assert_eq!(marker.sha256, sha256(&archive));
        assert_eq!(
            marker.entries,
            vec![PathBuf::from("scores/Income.csv"), PathBuf::from("README.pdf")]
        );
        assert_eq!(Marker::parse(&marker.render()), Some(marker));

        // Markers from older layouts never match
        assert_eq!(Marker::parse("imd.zip\n114\n"), None);
        assert_eq!(Marker::parse(""), None);
    }

    #[test]
    fn test_corrupt_archive_is_extraction_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("imd.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let err = extract_fixture(&archive, &temp.path().join("out")).unwrap_err();
        match err {
            LoaderError::Extraction { archive: failed, .. } => assert_eq!(failed, archive),
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_format_is_extraction_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("imd.rar");
        fs::write(&archive, b"Rar!").unwrap();

        let err = extract_fixture(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, LoaderError::Extraction { .. }));
    }

    #[test]
    fn test_zip_slip_is_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, &[("../escaped.csv", "x\n1\n")]);

        let out = temp.path().join("nested").join("out");
        let err = extract_fixture(&archive, &out).unwrap_err();

        assert!(matches!(err, LoaderError::Extraction { .. }));
        assert!(!temp.path().join("nested").join("escaped.csv").exists());
        assert!(!out.join(MARKER_FILE).exists());
    }

    #[test]
    fn test_extract_tar_gz() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("iod.tar.gz");
        {
            let encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"lsoa,score\nE01000001,0.5\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "domains/Crime.csv", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let extraction = extract_fixture(&archive, &temp.path().join("out")).unwrap();
        assert_eq!(extraction.files.len(), 1);
        assert_eq!(extraction.files[0].relative, PathBuf::from("domains/Crime.csv"));
    }

    #[test]
    fn test_is_tabular() {
        assert!(is_tabular(Path::new("x/File_1.CSV")));
        assert!(is_tabular(Path::new("x.tsv")));
        assert!(!is_tabular(Path::new("x.xlsx")));
        assert!(!is_tabular(Path::new("noextension")));
    }
}
