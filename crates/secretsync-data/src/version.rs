use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend-defined version of a remote secret document
///
/// Opaque to the reconciliation engine, which only compares versions for
/// equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteVersion {
    Number(u64),
    Text(String),
}

impl From<u64> for RemoteVersion {
    fn from(version: u64) -> Self {
        RemoteVersion::Number(version)
    }
}

impl fmt::Display for RemoteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteVersion::Number(n) => write!(f, "{n}"),
            RemoteVersion::Text(s) => f.write_str(s),
        }
    }
}
