//! Error types for cue sheet ingestion and duration parsing.
//!
//! The aggregator has no error path. Duration parse errors are recovered
//! inside the time normalizer and only surface through `try_parse_duration`.

use std::path::PathBuf;
use thiserror::Error;

/// Why a duration cell could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DurationParseError {
    /// Text that matches none of the known time layouts
    #[error("unrecognized time format: '{0}'")]
    Unrecognized(String),

    /// Digits matched but could not be converted
    #[error("invalid number in time value '{0}'")]
    InvalidNumber(String),

    /// NaN or infinite numeric cell
    #[error("non-finite numeric time value: {0}")]
    NonFinite(f64),
}

/// Failures while turning one source file into records.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable workbook {}: {source}", path.display())]
    Xlsx {
        path: PathBuf,
        #[source]
        source: calamine::XlsxError,
    },

    #[error("malformed CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
