//! Serialization formats for local secret files

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DataError;

/// Format of a local secret file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON document
    Json,
    /// YAML document
    Yaml,
    /// Raw string, written verbatim
    Text,
}

/// Formats a structured (`fromData`) mapping may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Json,
    Yaml,
}

impl From<DataFormat> for Format {
    fn from(format: DataFormat) -> Self {
        match format {
            DataFormat::Json => Format::Json,
            DataFormat::Yaml => Format::Yaml,
        }
    }
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Text => "text",
        }
    }

    /// Parse file content into a value
    pub fn parse(&self, bytes: &[u8]) -> Result<Value, DataError> {
        match self {
            Format::Json => serde_json::from_slice(bytes).map_err(|e| DataError::parse(*self, e)),
            Format::Yaml => serde_yaml::from_slice(bytes).map_err(|e| DataError::parse(*self, e)),
            Format::Text => String::from_utf8(bytes.to_vec())
                .map(Value::String)
                .map_err(|e| DataError::parse(*self, e)),
        }
    }

    /// Render a value as file content
    pub fn render(&self, value: &Value) -> Result<String, DataError> {
        match self {
            Format::Json => {
                let mut out = Vec::new();
                let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
                let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
                value
                    .serialize(&mut serializer)
                    .map_err(|e| DataError::render(*self, e))?;
                out.push(b'\n');
                String::from_utf8(out).map_err(|e| DataError::render(*self, e))
            }
            Format::Yaml => serde_yaml::to_string(value).map_err(|e| DataError::render(*self, e)),
            Format::Text => match value {
                Value::String(text) => Ok(text.clone()),
                _ => Err(DataError::render(*self, "value is not a string")),
            },
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Format::Json),
            "yaml" => Ok(Format::Yaml),
            "text" => Ok(Format::Text),
            other => Err(format!("unknown format '{other}'")),
        }
    }
}
