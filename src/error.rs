//! Error types for container conversion and reading

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for kbpack operations
#[derive(Error, Debug)]
pub enum KbpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input directory {0} does not exist")]
    MissingInputDirectory(PathBuf),

    #[error("Container file not found at {0}")]
    MissingContainer(PathBuf),

    #[error("Patient {0} not found in container")]
    UnknownPatient(String),

    #[error("ROI name attribute {0} is missing")]
    MissingRoiMetadata(String),

    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Checksum mismatch for {name}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data loader error: {0}")]
    Loader(String),
}

/// Specialized Result type for kbpack operations
pub type Result<T> = std::result::Result<T, KbpError>;

impl From<bincode::Error> for KbpError {
    fn from(err: bincode::Error) -> Self {
        KbpError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for KbpError {
    fn from(err: serde_json::Error) -> Self {
        KbpError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for KbpError {
    fn from(err: ndarray::ShapeError) -> Self {
        KbpError::InvalidDimensions(err.to_string())
    }
}
