//! Error taxonomy for the screener library
//!
//! Missing history before a candidate day is not an error: it resolves to
//! "not a target day" inside the pattern code. An empty series is reported as
//! a skipped symbol. Only store failures surface as errors, and they are kept
//! per symbol so one bad symbol never aborts the rest of a scan.

use std::path::PathBuf;
use thiserror::Error;

use crate::Symbol;

/// Failure of the series store to supply bars for a symbol
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("symbol {0} is not known to the store")]
    UnknownSymbol(Symbol),

    #[error("store query failed for {symbol}: {message}")]
    Query { symbol: Symbol, message: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("bars for {symbol} are not strictly increasing by date at {date}")]
    Unordered {
        symbol: Symbol,
        date: chrono::NaiveDate,
    },
}

impl StoreError {
    /// Whether the caller may reasonably try the same request again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Query { .. } | Self::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Errors raised while reading bar files
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("row {row}: invalid {field} value '{value}'")]
    Field {
        row: usize,
        field: &'static str,
        value: String,
    },
}

/// Invalid configuration values
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    ZeroWindow(&'static str),

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: String },

    #[error("data source '{0}' requires a path")]
    MissingPath(String),
}
