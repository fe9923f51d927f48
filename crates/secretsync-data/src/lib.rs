//! Data layer shared by the secretsync crates
//!
//! - [`path`]: read and write sub-values of JSON/YAML-shaped documents
//! - [`Format`]: parse and render local secret files
//! - [`canonical_hash`]: content address of a value, independent of key order
//! - [`RemoteVersion`]: opaque version token of a remote document
//!
//! Values are represented as [`serde_json::Value`] regardless of the file
//! format they came from.

mod error;
mod format;
mod hash;
pub mod path;
mod version;

pub use error::DataError;
pub use format::{DataFormat, Format};
pub use hash::{canonical_hash, fingerprint};
pub use path::{Path, Segment};
pub use version::RemoteVersion;

pub use serde_json::Value;
