//! ELT Tool Library
//!
//! Loads raw CSV exports into a cloud warehouse and drives the dbt
//! transformation layers on top of them.
//!
//! This crate provides:
//! - Schema registry for the raw tables
//! - CSV loader: header normalization, date derivation and coercion, column reordering
//! - BigQuery bulk loads authenticated with GCP ADC
//! - Readiness check, ingestion entry point and the ordered pipeline steps
//! - External process runner for dbt

pub mod auth;
pub mod config;
pub mod error;
pub mod ingest;
pub mod loader;
pub mod pipeline;
pub mod process;
pub mod readiness;
pub mod result;
pub mod schema;
pub mod warehouse;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use ingest::{IngestionSummary, Ingestor, SourceSpec, SOURCES};
pub use loader::{CsvLoader, LoadReport};
pub use pipeline::{DbtSettings, Pipeline};
pub use process::{ProcessRunner, ShellRunner};
pub use readiness::check_readiness;
pub use result::{PipelineReport, StepResult, StepStatus};
pub use schema::SchemaRegistry;
pub use warehouse::{BigQueryConfig, BigQueryWarehouse, Warehouse};
