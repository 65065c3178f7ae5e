//! Ingestion entry point: the ordered list of raw sources and the run that
//! loads them.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::loader::{CsvLoader, LoadReport};

/// How a source file is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMode {
    /// Date handling plus daily partitioning on `field`.
    Partitioned { field: &'static str },
    /// Reference data, no partitioning.
    Direct,
}

/// One raw source file and its target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub file: &'static str,
    pub table: &'static str,
    pub mode: LoadMode,
}

impl SourceSpec {
    const fn partitioned(file: &'static str, table: &'static str, field: &'static str) -> Self {
        Self {
            file,
            table,
            mode: LoadMode::Partitioned { field },
        }
    }

    const fn direct(file: &'static str, table: &'static str) -> Self {
        Self {
            file,
            table,
            mode: LoadMode::Direct,
        }
    }
}

/// Every raw source, in load order: operational tables first, then
/// reference tables.
pub const SOURCES: &[SourceSpec] = &[
    SourceSpec::partitioned("users (1).csv", "users", "createdAt"),
    SourceSpec::partitioned("orders (1).csv", "orders", "createdAt"),
    SourceSpec::partitioned("subscriptions (1).csv", "subscriptions", "createdAt"),
    SourceSpec::partitioned("shipments (1).csv", "shipments", "collectDate"),
    SourceSpec::direct("Marketing Spend (TRY).csv", "marketing_spend"),
    SourceSpec::direct("addresses (1).csv", "addresses"),
    SourceSpec::direct("countries (1).csv", "countries"),
    SourceSpec::direct("states (1).csv", "states"),
    SourceSpec::direct("cities (1).csv", "cities"),
    SourceSpec::direct("neighborhoods (1).csv", "neighborhoods"),
];

/// File names the readiness check expects.
pub fn expected_files(sources: &[SourceSpec]) -> Vec<&'static str> {
    sources.iter().map(|s| s.file).collect()
}

/// Result of a full ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionSummary {
    pub reports: Vec<LoadReport>,
    pub duration: Duration,
}

impl IngestionSummary {
    pub fn total_rows(&self) -> usize {
        self.reports.iter().map(|r| r.rows).sum()
    }
}

/// Loads every configured source, one at a time, stopping at the first
/// failure.
pub struct Ingestor {
    loader: CsvLoader,
    sources: Vec<SourceSpec>,
}

impl Ingestor {
    /// Ingestor over the built-in source list.
    pub fn new(loader: CsvLoader) -> Self {
        Self {
            loader,
            sources: SOURCES.to_vec(),
        }
    }

    pub fn sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    pub fn loader(&self) -> &CsvLoader {
        &self.loader
    }

    /// Ensure the dataset exists, then load every source in order.
    pub async fn run(&self) -> Result<IngestionSummary, PipelineError> {
        let start = Instant::now();
        tracing::info!(sources = self.sources.len(), "Loading all CSV files to the warehouse");

        self.loader.warehouse().ensure_dataset().await?;

        let mut reports = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let result = match source.mode {
                LoadMode::Partitioned { field } => {
                    self.loader
                        .load_partitioned(source.file, source.table, field)
                        .await
                }
                LoadMode::Direct => self.loader.load_direct(source.file, source.table).await,
            };

            match result {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(file = source.file, error = %e, "Failed to load source file");
                    return Err(e);
                }
            }
        }

        let summary = IngestionSummary {
            reports,
            duration: start.elapsed(),
        };
        tracing::info!(
            tables = summary.reports.len(),
            rows = summary.total_rows(),
            duration_secs = summary.duration.as_secs_f64(),
            "Ingestion complete"
        );
        Ok(summary)
    }
}
