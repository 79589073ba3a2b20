//! Error types for the fallible edges of the crate.
//!
//! Only export and file writing can fail. Validation, smoothing, conversion and aggregation
//! are infallible and report missing data through `Option`.

use thiserror::Error;

/// Errors surfaced to callers of the export functions.
#[derive(Debug, Error)]
pub enum Error {
    /// Writing to the destination failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV writer rejected a record.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Exported bytes were not valid UTF-8.
    #[error("encoding error: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Result alias used by the export functions.
pub type Result<T> = std::result::Result<T, Error>;
