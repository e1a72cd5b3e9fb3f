use std::io;

use mesh_data::DataError;
use thiserror::Error;

/// Error types for mesh loading and animation setup
#[derive(Error, Debug)]
pub enum MeshError {
    /// I/O Error during reading
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Low-level stream or chunk error
    #[error(transparent)]
    Data(#[from] DataError),

    /// Invalid magic number in the file header
    #[error("Invalid magic number: expected '{expected}', got '{actual}'")]
    InvalidMagic { expected: String, actual: String },

    /// Unsupported file version
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    /// Recognised format variant that is not supported (e.g. compressed X files)
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The file is not one of the known mesh formats
    #[error("Unknown mesh format: {0}")]
    UnknownFormat(String),

    /// Structural error with location information
    #[error("{file}: parse error at {location}: {message}")]
    Parse {
        file: String,
        location: String,
        message: String,
    },

    /// Error during validation
    #[error("Validation error: {0}")]
    Validation(String),
}

impl MeshError {
    /// Parse error at a byte offset
    pub fn at_offset(file: &str, offset: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.to_string(),
            location: format!("offset {offset}"),
            message: message.into(),
        }
    }

    /// Parse error at a line of a text file
    pub fn at_line(file: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.to_string(),
            location: format!("line {line}"),
            message: message.into(),
        }
    }
}

/// Result type using MeshError
pub type Result<T> = std::result::Result<T, MeshError>;
