//! # Error Types
//!
//! Structured error hierarchy for the analytics pipeline using `thiserror`.
//!
//! - [`SourceError`] - failures while opening, reading or releasing a data source
//! - [`AggregationError`] - failures of a chunked aggregation run
//! - [`SinkError`] - failures while persisting a result table
//! - [`AnalyticsError`] - top-level error returned by reports and the CLI

use crate::config::ConfigurationError;
use thiserror::Error;

/// Errors raised by a data source while streaming rows.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source connection error: {message}")]
    Connection { message: String },

    #[error("Source query failed: {message}")]
    Query { message: String },

    #[error("Failed to fetch next batch: {message}")]
    Fetch { message: String },

    #[error("Failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    #[error("Unsupported type '{type_name}' for column '{column}'")]
    UnsupportedColumn { column: String, type_name: String },

    #[error("Source returned {returned} rows for a fetch of at most {requested}")]
    Overfetch { requested: usize, returned: usize },

    #[error("Source stream already exhausted")]
    Exhausted,

    #[error("Source already released")]
    Released,

    #[error("Failed to release source: {message}")]
    Release { message: String },
}

impl SourceError {
    /// Create a connection error
    pub fn connection(message: impl ToString) -> Self {
        Self::Connection {
            message: message.to_string(),
        }
    }

    /// Create a query error
    pub fn query(message: impl ToString) -> Self {
        Self::Query {
            message: message.to_string(),
        }
    }

    /// Create a fetch error
    pub fn fetch(message: impl ToString) -> Self {
        Self::Fetch {
            message: message.to_string(),
        }
    }

    /// Create a column decode error
    pub fn decode(column: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.to_string(),
        }
    }

    /// Create an unsupported column type error
    pub fn unsupported_column(column: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnsupportedColumn {
            column: column.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a release error
    pub fn release(message: impl ToString) -> Self {
        Self::Release {
            message: message.to_string(),
        }
    }
}

/// Errors raised by a chunked aggregation run.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Malformed row: column '{column}': {reason}")]
    MalformedRow { column: String, reason: String },

    #[error("Batch size must be a positive integer, got {0}")]
    InvalidBatchSize(usize),
}

impl AggregationError {
    /// Create a malformed row error
    pub fn malformed_row(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed row error for a column absent from the row
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::malformed_row(column, "column not present in row")
    }
}

/// Errors raised while persisting result tables.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("Type mismatch in table '{table}', column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to write table '{table}': {message}")]
    Write { table: String, message: String },
}

impl SinkError {
    /// Create an invalid identifier error
    pub fn invalid_identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a write error
    pub fn write(table: impl Into<String>, message: impl ToString) -> Self {
        Self::Write {
            table: table.into(),
            message: message.to_string(),
        }
    }
}

/// Top-level error for reports, database helpers and the CLI.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database error: {message}")]
    Database { message: String },
}

impl AnalyticsError {
    /// Create a database error
    pub fn database(message: impl ToString) -> Self {
        Self::Database {
            message: message.to_string(),
        }
    }
}

impl From<SourceError> for AnalyticsError {
    fn from(error: SourceError) -> Self {
        Self::Aggregation(AggregationError::Source(error))
    }
}

impl From<sqlx::Error> for AnalyticsError {
    fn from(error: sqlx::Error) -> Self {
        Self::database(error)
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
