//! Pipeline error types.

use thiserror::Error;

/// Errors that can occur while checking, loading or transforming raw data.
///
/// Every variant is fatal to the current file and to the batch. Unparseable
/// timestamps are not errors, see [`crate::loader::DateParseSoftFailure`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Expected source files are absent from the raw-data directory.
    #[error("Missing required CSV files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),

    /// Table is not registered in the schema registry.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Two raw headers normalize to the same column name.
    #[error("Header collision: '{first}' and '{second}' both normalize to '{normalized}'")]
    HeaderCollision {
        first: String,
        second: String,
        normalized: String,
    },

    /// A required schema column is absent from the source file.
    #[error("Missing required column '{column}' for table {table}")]
    MissingRequiredColumn { table: String, column: String },

    /// Partition field is not one of the table's schema fields.
    #[error("Partition field '{field}' is not defined for table {table}")]
    InvalidPartitionField { table: String, field: String },

    /// Warehouse rejected or failed the load job.
    #[error("Load job failed for table {table}: {message}")]
    LoadJob { table: String, message: String },

    /// External process exited with a non-zero code.
    #[error("{step} failed with exit code {exit_code}: {stderr}")]
    ExternalProcess {
        step: String,
        exit_code: i32,
        stderr: String,
    },

    /// Process spawn error.
    #[error("Process error: {0}")]
    Process(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Http(e.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        PipelineError::Csv(e.to_string())
    }
}
