use thiserror::Error;

use crate::format::Format;

/// Errors produced while traversing, parsing or rendering secret data
#[derive(Debug, Error)]
pub enum DataError {
    /// The path leads to an absent key or an out-of-range index
    #[error("Missing data: {0}")]
    MissingData(String),

    /// The path does not fit the shape of the document
    #[error("Type error: {0}")]
    Type(String),

    /// Local content could not be parsed in the given format
    #[error("Failed to parse {format} data: {message}")]
    Parse { format: Format, message: String },

    /// A value could not be rendered in the given format
    #[error("Failed to render {format} data: {message}")]
    Render { format: Format, message: String },
}

impl DataError {
    /// True when the error only signals absent data
    pub fn is_missing_data(&self) -> bool {
        matches!(self, DataError::MissingData(_))
    }

    pub(crate) fn parse(format: Format, message: impl ToString) -> Self {
        Self::Parse {
            format,
            message: message.to_string(),
        }
    }

    pub(crate) fn render(format: Format, message: impl ToString) -> Self {
        Self::Render {
            format,
            message: message.to_string(),
        }
    }
}
