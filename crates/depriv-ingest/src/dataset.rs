//! Published deprivation datasets the loaders know how to ingest

use depriv_common::LoaderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Unverified: these follow the gov.uk asset layout but have not been checked
// against the published release. Override with `--source-url` or
// `<PREFIX>SOURCE_URL`, and pin the archive with `<PREFIX>SHA256`.

/// English Indices of Multiple Deprivation 2025, all files
pub const IMD_2025_URL: &str =
    "https://assets.publishing.service.gov.uk/media/imd2025/IMD2025_All_Files.zip";

/// English Indices of Deprivation 2025, all domains and supplementary indices
pub const IOD_2025_URL: &str =
    "https://assets.publishing.service.gov.uk/media/iod2025/IoD2025_All_Files.zip";

/// A dataset release handled by one of the command-line tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Imd2025,
    Iod2025,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Imd2025, Dataset::Iod2025];

    /// Binary name (`imd`, `iod`)
    pub fn command_name(self) -> &'static str {
        match self {
            Dataset::Imd2025 => "imd",
            Dataset::Iod2025 => "iod",
        }
    }

    /// Stable identifier used for directories, error tags and the flat-archive schema
    pub fn slug(self) -> &'static str {
        match self {
            Dataset::Imd2025 => "imd2025",
            Dataset::Iod2025 => "iod2025",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Dataset::Imd2025 => "English Indices of Multiple Deprivation 2025",
            Dataset::Iod2025 => "English Indices of Deprivation 2025",
        }
    }

    pub fn default_url(self) -> &'static str {
        match self {
            Dataset::Imd2025 => IMD_2025_URL,
            Dataset::Iod2025 => IOD_2025_URL,
        }
    }

    /// Prefix for environment overrides, e.g. `IMD_DB_PATH`
    pub fn env_prefix(self) -> &'static str {
        match self {
            Dataset::Imd2025 => "IMD_",
            Dataset::Iod2025 => "IOD_",
        }
    }

    /// Name of the MotherDuck database when none is given
    pub fn default_remote_name(self) -> &'static str {
        self.slug()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Dataset {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "imd" | "imd2025" => Ok(Dataset::Imd2025),
            "iod" | "iod2025" => Ok(Dataset::Iod2025),
            other => Err(LoaderError::config(format!("unknown dataset '{}'", other))),
        }
    }
}
