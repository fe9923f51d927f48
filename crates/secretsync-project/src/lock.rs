//! Lock state: what each file looked like after the last successful sync
//!
//! ```yaml
//! files:
//!   db.json:
//!     remoteVersion: 3
//!     localHash: 5f1c...
//!     localFormat: json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use secretsync_data::{canonical_hash, DataError, Format, RemoteVersion, Value};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::SyncError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockState {
    #[serde(default)]
    pub files: BTreeMap<String, LockedFile>,
}

/// Last reconciled state of one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_version: Option<RemoteVersion>,
    /// Canonical hash of the parsed local value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_hash: Option<String>,
    /// Written as `''` when unknown so every record keeps the same keys
    #[serde(
        default,
        serialize_with = "format_or_empty",
        deserialize_with = "lenient_format"
    )]
    pub local_format: Option<Format>,
}

fn format_or_empty<S: Serializer>(format: &Option<Format>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(format.map_or("", |f| f.name()))
}

/// Unknown or empty format names read as "no format recorded"
fn lenient_format<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Format>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|name| name.parse().ok()))
}

impl LockState {
    /// Read a lock file; a missing file is an empty state
    pub fn read(path: &Path) -> Result<Self, SyncError> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(SyncError::io(path, e)),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_yaml::from_slice(&content).map_err(|e| SyncError::yaml(path, e))
    }

    pub fn write(&self, path: &Path) -> Result<(), SyncError> {
        let content = serde_yaml::to_string(self).map_err(|e| SyncError::yaml(path, e))?;
        fs::write(path, content).map_err(|e| SyncError::io(path, e))
    }

    pub fn get(&self, file: &str) -> Option<&LockedFile> {
        self.files.get(file)
    }
}

/// The local side of an entry at the start of a sync
#[derive(Debug, Clone, PartialEq)]
pub enum LocalContent {
    Absent,
    /// The file exists but parses in neither candidate format
    Unparsable { error: String },
    Parsed {
        value: Value,
        hash: String,
        format: Format,
    },
}

impl LocalContent {
    /// Read and parse a local file
    ///
    /// The format recorded in the lock is tried first so that a file written
    /// before a format change is still recognised; `configured` is the fallback.
    pub fn read(path: &Path, recorded: Option<Format>, configured: Format) -> Result<Self, SyncError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LocalContent::Absent),
            Err(e) => return Err(SyncError::io(path, e)),
        };

        Ok(Self::parse(&bytes, recorded, configured))
    }

    pub fn parse(bytes: &[u8], recorded: Option<Format>, configured: Format) -> Self {
        let mut last_error: Option<DataError> = None;

        for format in recorded.into_iter().chain(std::iter::once(configured)) {
            match format.parse(bytes) {
                Ok(value) => {
                    return LocalContent::Parsed {
                        hash: canonical_hash(&value),
                        value,
                        format,
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }

        LocalContent::Unparsable {
            error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        }
    }

    pub fn hash(&self) -> Option<&str> {
        match self {
            LocalContent::Parsed { hash, .. } => Some(hash),
            _ => None,
        }
    }

    /// Format the file was parsed with
    pub fn format(&self) -> Option<Format> {
        match self {
            LocalContent::Parsed { format, .. } => Some(*format),
            _ => None,
        }
    }
}
