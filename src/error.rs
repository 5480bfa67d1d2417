// Error taxonomy for ingestion, configuration and reference data.
//
// Fatal errors (IngestError, ConfigError, PestDataError) abort startup.
// RowError never leaves the parser: a bad row is logged and skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Ingestion failures that prevent a Catalog from being built.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The price source could not be opened.
    #[error("failed to open price source {}: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The header row could not be read (I/O, encoding, or empty source).
    #[error("failed to read header of {label}: {reason}")]
    HeaderUnreadable { label: String, reason: String },
}

/// Why a single data row was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("record has {found} fields, expected at least {expected}")]
    ColumnCount { found: usize, expected: usize },

    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid date (expected YYYY-MM-DD): {0:?}")]
    InvalidDate(String),

    #[error("unreadable record: {0}")]
    Unreadable(String),
}

/// Bad configuration value from the environment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Pest reference file could not be loaded.
#[derive(Error, Debug)]
pub enum PestDataError {
    #[error("failed to read pest data {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed pest data {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
