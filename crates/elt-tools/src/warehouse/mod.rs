//! Warehouse bulk-load interface.
//!
//! - `LoadJob` - the per-file load policy handed to the warehouse
//! - `Warehouse` - dataset bootstrap and synchronous bulk load
//! - `BigQueryWarehouse` - REST implementation authenticated with ADC

mod bigquery;

pub use self::bigquery::{BigQueryConfig, BigQueryWarehouse};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PipelineError;
use crate::schema::{FieldSpec, TableSchema};

/// Source file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFormat {
    #[default]
    Csv,
}

/// What happens to existing table data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    /// Replace all table contents.
    #[default]
    WriteTruncate,
}

/// Daily time partitioning on a named field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePartitioning {
    #[serde(rename = "type")]
    pub partition_type: String,
    pub field: String,
}

impl TimePartitioning {
    /// Partition by day on `field`.
    pub fn daily(field: impl Into<String>) -> Self {
        Self {
            partition_type: "DAY".to_string(),
            field: field.into(),
        }
    }
}

/// A single bulk load, created per source file.
#[derive(Debug, Clone)]
pub struct LoadJob {
    pub table: String,
    pub schema: Vec<FieldSpec>,
    pub source_format: SourceFormat,
    pub write_disposition: WriteDisposition,
    pub skip_leading_rows: u32,
    pub ignore_unknown_values: bool,
    pub allow_quoted_newlines: bool,
    pub time_partitioning: Option<TimePartitioning>,
}

impl LoadJob {
    /// Full-overwrite CSV load with an explicit schema and one header row.
    pub fn new(schema: &TableSchema) -> Self {
        Self {
            table: schema.name.to_string(),
            schema: schema.fields.clone(),
            source_format: SourceFormat::Csv,
            write_disposition: WriteDisposition::WriteTruncate,
            skip_leading_rows: 1,
            ignore_unknown_values: true,
            allow_quoted_newlines: true,
            time_partitioning: None,
        }
    }

    /// Add daily partitioning on `field`.
    pub fn partitioned_by(mut self, field: impl Into<String>) -> Self {
        self.time_partitioning = Some(TimePartitioning::daily(field));
        self
    }
}

/// Completed load job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_rows: Option<u64>,
}

/// Target warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create the target dataset if it does not exist yet.
    async fn ensure_dataset(&self) -> Result<(), PipelineError>;

    /// Run `job` with the contents of `source` and wait until the warehouse
    /// reports completion.
    async fn load(&self, job: &LoadJob, source: &Path) -> Result<LoadOutcome, PipelineError>;
}
