//! Error taxonomy for the alignment pipeline
//!
//! Every fatal condition in the pipeline maps to one of these kinds. Per-file
//! extraction failures and per-assertion evaluation failures are *data*
//! (collected into the extraction outcome and the report), never errors of
//! this type.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal pipeline errors.
///
/// Anything that reaches the driver as an `Err` maps to process exit code 2.
#[derive(Debug, Error)]
pub enum AlignError {
    /// Configuration violates its constraints (zero workers, missing path, ...)
    #[error("invalid configuration: {0}")]
    InputInvalid(String),

    /// A required file or directory could not be read
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The trace file's top-level JSON does not have the expected shape
    #[error("invalid trace format: {0}")]
    FormatInvalid(String),

    /// The trace ingester's memory budget was exceeded
    #[error("memory budget exceeded: {retained} bytes retained, limit {limit}")]
    MemoryExceeded { retained: u64, limit: u64 },

    /// The job deadline expired before alignment could start, so no
    /// contract ran and no report exists. Expiry during alignment is not
    /// this error; those contracts come back FAILED in a normal report.
    #[error("alignment job cancelled before any contract ran")]
    Cancelled,

    /// An internal invariant did not hold (report self-check failure, ...)
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl AlignError {
    /// Wrap an I/O failure with the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AlignError::Io {
            path: path.into(),
            source,
        }
    }
}
