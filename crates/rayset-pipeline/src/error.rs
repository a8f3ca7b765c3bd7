//! Error types for conversion jobs.

use thiserror::Error;

use rayset_codec::FormatError;
use rayset_sample::SampleError;

/// Errors that can terminate a conversion job.
///
/// Every error is local to one [`crate::convert`] invocation; a failed job
/// never affects concurrently running jobs.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Source file failed structural validation, or the target format
    /// cannot represent the source flags.
    #[error(transparent)]
    Format(FormatError),

    /// Caller-supplied target ray count out of range.
    #[error(transparent)]
    Sample(#[from] SampleError),

    /// Source unreadable or target unwritable.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Job cancelled by the caller; the partial target was removed.
    #[error("conversion cancelled")]
    Cancelled,

    /// Worker thread terminated abnormally.
    #[error("conversion worker terminated abnormally")]
    Worker,
}

impl From<FormatError> for ConvertError {
    fn from(e: FormatError) -> Self {
        // Keep plain I/O failures in their own bucket; everything else a
        // codec reports is structural.
        match e {
            FormatError::Io(io) => ConvertError::Io(io),
            other => ConvertError::Format(other),
        }
    }
}

/// Result type for conversion jobs.
pub type Result<T> = std::result::Result<T, ConvertError>;
