//! Error types for ray file decoding and encoding.

use thiserror::Error;

use crate::format::RayFormat;

/// Errors that can occur while decoding or encoding a ray file.
#[derive(Error, Debug)]
pub enum FormatError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File ends before a complete header could be read.
    #[error("file too small to contain a valid {0} header")]
    TruncatedHeader(RayFormat),

    /// Declared ray count disagrees with the record bytes actually present.
    #[error("header declares {declared} rays but the body holds {actual}")]
    HeaderMismatch {
        /// Ray count declared by the header.
        declared: u64,
        /// Ray count the body actually holds.
        actual: u64,
    },

    /// Body length is not an exact multiple of the computed record width.
    #[error("truncated record at byte offset {offset}")]
    TruncatedRecord {
        /// Byte offset of the first incomplete record.
        offset: u64,
    },

    /// Header flag values that this codec cannot represent or accept.
    #[error("unsupported flag combination: {0}")]
    UnsupportedFlagCombination(String),

    /// The format is an output target only.
    #[error("{0} files cannot be decoded")]
    DecodeUnsupported(RayFormat),

    /// A text record or header line failed to parse.
    #[error("malformed text at line {line}: {message}")]
    MalformedText {
        /// 1-indexed line number.
        line: u64,
        /// What was wrong with the line.
        message: String,
    },

    /// A record's optional fields disagree with the header flags.
    #[error("record does not match header flags: {0}")]
    RecordMismatch(&'static str),
}

impl FormatError {
    /// Create an unsupported-flag-combination error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedFlagCombination(message.into())
    }

    /// Create a malformed-text error.
    pub fn malformed_text(line: u64, message: impl Into<String>) -> Self {
        Self::MalformedText {
            line,
            message: message.into(),
        }
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, FormatError>;

/// Map a failed header read: EOF means the file is too small, anything
/// else is a plain I/O error.
pub(crate) fn short_header(err: std::io::Error, format: RayFormat) -> FormatError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        FormatError::TruncatedHeader(format)
    } else {
        FormatError::Io(err)
    }
}
