//! Error types for the ISA sampler.
//!
//! Only the outer boundary of the crate returns these: opening the input,
//! recognising its container, loading configuration. Problems found while
//! sampling are recorded as [`crate::sampler::report::Issue`]s instead.

use thiserror::Error;

use crate::io::error::IoError;

/// Main error type for sampler operations.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// The container could not be parsed at all
    #[error("Invalid binary format: {0}")]
    InvalidFormat(String),

    /// The container parsed but is not one the sampler understands
    #[error("Unsupported container format: {0}")]
    UnsupportedFormat(String),

    /// No decode primitive exists for this architecture
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// File access errors
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Analysis deadline elapsed before a partial result could be collected
    #[error("Analysis timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for SamplerError {
    fn from(err: std::io::Error) -> Self {
        SamplerError::Io(IoError::StdIo(err))
    }
}

impl From<serde_json::Error> for SamplerError {
    fn from(err: serde_json::Error) -> Self {
        SamplerError::Config(err.to_string())
    }
}

impl From<object::read::Error> for SamplerError {
    fn from(err: object::read::Error) -> Self {
        SamplerError::InvalidFormat(err.to_string())
    }
}

/// Result type alias for sampler operations
pub type Result<T> = std::result::Result<T, SamplerError>;
