use std::{borrow::Borrow, fmt, ops::Deref};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FOLDER_MIMETYPE: &str = "application/vnd.google-apps.folder";

/// An opaque remote file or folder id
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// The alias Drive accepts for the root of "My Drive"
    pub fn root() -> Self {
        Self("root".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Deref for FileId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FileId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({:?})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file or directory read from the local file system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub name: String,
    pub path: Utf8PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

/// A file or folder listed from the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: FileId,
    pub name: String,
    pub mime_type: String,
    /// `None` if the store didn't send it or it could not be parsed
    pub mtime: Option<DateTime<Utc>>,
    pub md5: Option<String>,
    pub can_download: bool,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIMETYPE
    }

    /// Whether the entry has binary content that can be compared and downloaded.
    /// Google documents have neither a checksum nor downloadable content.
    pub fn is_binary(&self) -> bool {
        self.can_download && self.md5.as_deref().is_some_and(|md5| !md5.is_empty())
    }
}

/// The decision taken for one entry during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    SkipEqual,
    SkipNotDownloadable,
    UploadNew,
    DownloadNew,
    UploadNewer,
    DownloadNewer,
    CreateFolderRemote,
    CreateFolderLocal,
}

impl Outcome {
    /// Whether the outcome changed anything on either side
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::SkipEqual | Self::SkipNotDownloadable)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipEqual => f.write_str("identical, skipping"),
            Self::SkipNotDownloadable => f.write_str("cannot be downloaded, skipping"),
            Self::UploadNew => f.write_str("uploading to drive"),
            Self::DownloadNew => f.write_str("downloading from drive"),
            Self::UploadNewer => f.write_str("newer locally, uploading"),
            Self::DownloadNewer => f.write_str("newer in drive, downloading"),
            Self::CreateFolderRemote => f.write_str("creating folder in drive"),
            Self::CreateFolderLocal => f.write_str("creating folder locally"),
        }
    }
}
