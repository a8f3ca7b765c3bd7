//! Error types for selection planning.

use thiserror::Error;

/// Errors that can occur while planning a selection.
#[derive(Error, Debug)]
pub enum SampleError {
    /// Requested target ray count is outside `[1, total]`.
    #[error("target ray count {target} is outside the valid range{}", if *total > 0 { format!(" [1, {total}]") } else { String::new() })]
    InvalidTarget {
        /// The requested target count.
        target: u64,
        /// The source ray count (0 when rejected before the source was read).
        total: u64,
    },
}

/// Result type for sampling operations.
pub type Result<T> = std::result::Result<T, SampleError>;
