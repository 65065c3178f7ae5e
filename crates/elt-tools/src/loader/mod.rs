//! CSV loader.
//!
//! Turns one raw CSV into a table whose columns match a registered schema,
//! then hands it to the warehouse as a full-overwrite load:
//!
//! `Pending -> HeaderNormalized -> (Derived) -> TypeCoerced -> Reordered -> Loaded | Failed`
//!
//! Partitioned loads run every stage. Direct loads skip derivation and
//! timestamp coercion but are still reordered to the schema.

mod dates;
mod header;
mod table;

pub use self::dates::{coerce_timestamp, extract_shipment_date, parse_timestamp, DateParseSoftFailure, WIRE_FORMAT};
pub use self::header::{normalize_header, normalize_headers, CURRENCY_MARKERS};
pub use self::table::{Projection, RawTable};

use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PipelineError;
use crate::schema::{SchemaRegistry, TableSchema};
use crate::warehouse::{LoadJob, Warehouse};

/// Processing stage of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    Pending,
    HeaderNormalized,
    Derived,
    TypeCoerced,
    Reordered,
    Loaded,
    Failed,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoadStage::Pending => "pending",
            LoadStage::HeaderNormalized => "header_normalized",
            LoadStage::Derived => "derived",
            LoadStage::TypeCoerced => "type_coerced",
            LoadStage::Reordered => "reordered",
            LoadStage::Loaded => "loaded",
            LoadStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one successful file load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub file: String,
    pub table: String,
    pub stage: LoadStage,
    /// Data rows written to the working file.
    pub rows: usize,
    /// Partition values that could not be parsed and were loaded as null.
    pub coerced_nulls: usize,
    /// Nullable schema columns absent from the source.
    pub filled_columns: Vec<String>,
    /// Source columns with no schema field.
    pub dropped_columns: Vec<String>,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_rows: Option<u64>,
}

/// Tracks the stage of one file and logs its transitions.
struct StageTracker<'a> {
    table: &'a str,
    stage: LoadStage,
}

impl<'a> StageTracker<'a> {
    fn new(table: &'a str) -> Self {
        Self {
            table,
            stage: LoadStage::Pending,
        }
    }

    fn advance(&mut self, next: LoadStage) {
        tracing::debug!(table = self.table, from = %self.stage, to = %next, "Load stage");
        self.stage = next;
    }

    fn fail(&mut self, error: &PipelineError) {
        tracing::error!(table = self.table, stage = %self.stage, error = %error, "Load failed");
        self.stage = LoadStage::Failed;
    }
}

/// The partition column of shipments has to be derived from `details`.
fn derives_from_details(table: &str, partition_field: &str) -> bool {
    table == "shipments" && partition_field == "collectDate"
}

/// Reconciles raw CSVs against the schema registry and loads them.
#[derive(Clone)]
pub struct CsvLoader {
    registry: Arc<SchemaRegistry>,
    warehouse: Arc<dyn Warehouse>,
    raw_data_dir: PathBuf,
    work_dir: PathBuf,
}

impl CsvLoader {
    /// Create a loader reading from `raw_data_dir` and writing working files
    /// into `work_dir`.
    pub fn new(
        registry: Arc<SchemaRegistry>,
        warehouse: Arc<dyn Warehouse>,
        raw_data_dir: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            warehouse,
            raw_data_dir: raw_data_dir.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    pub fn raw_data_dir(&self) -> &Path {
        &self.raw_data_dir
    }

    /// Load an operational table with date handling and daily partitioning
    /// on `partition_field`.
    pub async fn load_partitioned(
        &self,
        file: &str,
        table: &str,
        partition_field: &str,
    ) -> Result<LoadReport, PipelineError> {
        tracing::info!(file, table, partition_field, "Loading processed table");
        self.load_file(file, table, Some(partition_field)).await
    }

    /// Load a reference table without partitioning.
    pub async fn load_direct(&self, file: &str, table: &str) -> Result<LoadReport, PipelineError> {
        tracing::info!(file, table, "Loading direct reference table");
        self.load_file(file, table, None).await
    }

    async fn load_file(
        &self,
        file: &str,
        table: &str,
        partition_field: Option<&str>,
    ) -> Result<LoadReport, PipelineError> {
        let mut tracker = StageTracker::new(table);
        match self.process(file, table, partition_field, &mut tracker).await {
            Ok(report) => {
                tracing::info!(
                    table,
                    rows = report.rows,
                    coerced_nulls = report.coerced_nulls,
                    job_id = %report.job_id,
                    "Successfully loaded table"
                );
                Ok(report)
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        file: &str,
        table_name: &str,
        partition_field: Option<&str>,
        tracker: &mut StageTracker<'_>,
    ) -> Result<LoadReport, PipelineError> {
        let schema = self.registry.lookup(table_name)?;
        if let Some(field) = partition_field {
            if schema.field(field).is_none() {
                return Err(PipelineError::InvalidPartitionField {
                    table: table_name.to_string(),
                    field: field.to_string(),
                });
            }
        }

        let path = self.raw_data_dir.join(file);
        let reader = File::open(&path)
            .map_err(|e| PipelineError::Io(format!("{}: {}", path.display(), e)))?;
        let mut table = RawTable::read_csv(BufReader::new(reader))?;
        tracker.advance(LoadStage::HeaderNormalized);

        let mut coerced_nulls = 0;
        if let Some(field) = partition_field {
            if derives_from_details(table_name, field) {
                derive_shipment_dates(&mut table, field);
                tracker.advance(LoadStage::Derived);
            }
            coerced_nulls = coerce_partition_column(&mut table, table_name, field);
            tracker.advance(LoadStage::TypeCoerced);
        }

        let projection = table.project(schema)?;
        if !projection.filled.is_empty() {
            tracing::warn!(table = table_name, columns = ?projection.filled, "Source lacks nullable columns, loading them as null");
        }
        if !projection.dropped.is_empty() {
            tracing::debug!(table = table_name, columns = ?projection.dropped, "Dropping columns not in schema");
        }
        tracker.advance(LoadStage::Reordered);

        let mut job = LoadJob::new(schema);
        if let Some(field) = partition_field {
            job = job.partitioned_by(field);
        }
        let outcome = self.load_projected(schema, &projection.table, &job).await?;
        tracker.advance(LoadStage::Loaded);

        Ok(LoadReport {
            file: file.to_string(),
            table: table_name.to_string(),
            stage: LoadStage::Loaded,
            rows: projection.table.rows.len(),
            coerced_nulls,
            filled_columns: projection.filled.iter().map(|s| s.to_string()).collect(),
            dropped_columns: projection.dropped,
            job_id: outcome.job_id,
            output_rows: outcome.output_rows,
        })
    }

    /// Write `table` to a working file and run the load. The working file is
    /// removed once the warehouse call returns, whatever its outcome.
    async fn load_projected(
        &self,
        schema: &TableSchema,
        table: &RawTable,
        job: &LoadJob,
    ) -> Result<crate::warehouse::LoadOutcome, PipelineError> {
        let mut working = tempfile::Builder::new()
            .prefix("temp_load_")
            .suffix(".csv")
            .tempfile_in(&self.work_dir)
            .map_err(|e| PipelineError::Io(format!("{}: {}", self.work_dir.display(), e)))?;

        {
            let mut writer = BufWriter::new(working.as_file_mut());
            table.write_csv(&mut writer)?;
            writer.flush()?;
        }
        tracing::debug!(table = schema.name, path = %working.path().display(), "Working file written");

        let outcome = self.warehouse.load(job, working.path()).await;

        let path: PathBuf = working.path().to_path_buf();
        if let Err(e) = working.close() {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove working file");
        }

        outcome
    }
}

/// Replace `field` with dates parsed out of the `details` column.
fn derive_shipment_dates(table: &mut RawTable, field: &str) {
    let values: Vec<Option<String>> = match table.column("details") {
        Some(details) => details.map(extract_shipment_date).collect(),
        None => {
            tracing::warn!(field, "No details column to derive dates from");
            vec![None; table.rows.len()]
        }
    };

    let missing = values.iter().filter(|v| v.is_none()).count();
    if missing > 0 {
        tracing::debug!(field, rows = missing, "Rows without a datetime in details");
    }
    table.set_column(field, values);
}

/// Coerce `field` to the wire timestamp format. Returns how many non-empty
/// values could not be parsed.
fn coerce_partition_column(table: &mut RawTable, table_name: &str, field: &str) -> usize {
    let Some(column) = table.column(field) else {
        return 0;
    };

    let mut failures: Vec<DateParseSoftFailure> = Vec::new();
    let values: Vec<Option<String>> = column
        .map(|raw| {
            coerce_timestamp(raw).unwrap_or_else(|failure| {
                failures.push(failure);
                None
            })
        })
        .collect();

    if let Some(first) = failures.first() {
        tracing::warn!(
            table = table_name,
            field,
            count = failures.len(),
            example = %first.value,
            "Unparseable timestamps loaded as null"
        );
    }

    table.set_column(field, values);
    failures.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::LoadOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every load and the working file contents at load time.
    #[derive(Default)]
    struct MockWarehouse {
        loads: Mutex<Vec<(LoadJob, PathBuf, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Warehouse for MockWarehouse {
        async fn ensure_dataset(&self) -> Result<(), PipelineError> {
            Ok(())
        }

        async fn load(&self, job: &LoadJob, source: &Path) -> Result<LoadOutcome, PipelineError> {
            let contents = std::fs::read_to_string(source).unwrap();
            self.loads
                .lock()
                .unwrap()
                .push((job.clone(), source.to_path_buf(), contents));
            if self.fail {
                return Err(PipelineError::LoadJob {
                    table: job.table.clone(),
                    message: "rejected".to_string(),
                });
            }
            Ok(LoadOutcome {
                job_id: format!("job_{}", job.table),
                output_rows: None,
            })
        }
    }

    struct Fixture {
        raw: tempfile::TempDir,
        work: tempfile::TempDir,
        warehouse: Arc<MockWarehouse>,
        loader: CsvLoader,
    }

    fn fixture(fail: bool) -> Fixture {
        let raw = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let warehouse = Arc::new(MockWarehouse {
            fail,
            ..Default::default()
        });
        let loader = CsvLoader::new(
            Arc::new(SchemaRegistry::builtin()),
            warehouse.clone(),
            raw.path(),
            work.path(),
        );
        Fixture {
            raw,
            work,
            warehouse,
            loader,
        }
    }

    impl Fixture {
        fn write(&self, file: &str, contents: &str) {
            std::fs::write(self.raw.path().join(file), contents).unwrap();
        }

        fn loaded(&self) -> Vec<(LoadJob, PathBuf, String)> {
            self.warehouse.loads.lock().unwrap().clone()
        }

        fn work_dir_is_empty(&self) -> bool {
            std::fs::read_dir(self.work.path()).unwrap().next().is_none()
        }
    }

    #[tokio::test]
    async fn test_partitioned_users() {
        let fx = fixture(false);
        fx.write(
            "users (1).csv",
            "createdAt,_id,email\n2024-03-05T09:30:00.000Z,u1,a@b.c\nnot a date,u2,d@e.f\n,u3,\n",
        );

        let report = fx
            .loader
            .load_partitioned("users (1).csv", "users", "createdAt")
            .await
            .unwrap();

        assert_eq!(report.stage, LoadStage::Loaded);
        assert_eq!(report.rows, 3);
        assert_eq!(report.coerced_nulls, 1);
        assert_eq!(report.dropped_columns, vec!["email"]);

        let loads = fx.loaded();
        assert_eq!(loads.len(), 1);
        let (job, _, contents) = &loads[0];
        assert_eq!(job.table, "users");
        assert_eq!(job.time_partitioning.as_ref().unwrap().field, "createdAt");
        assert_eq!(
            contents,
            "_id,createdAt\nu1,2024-03-05 09:30:00.000000\nu2,\nu3,\n"
        );
    }

    #[tokio::test]
    async fn test_shipments_derive_collect_date() {
        let fx = fixture(false);
        fx.write(
            "shipments (1).csv",
            "_id,_order,_user,details,label\n\
             sh1,o1,u1,\"{'collectDate': datetime.datetime(2024, 3, 5, 9, 30, 0)}\",L1\n\
             sh2,o2,u2,\"{'status': 'pending'}\",L2\n",
        );

        let report = fx
            .loader
            .load_partitioned("shipments (1).csv", "shipments", "collectDate")
            .await
            .unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.coerced_nulls, 0);

        let (_, _, contents) = &fx.loaded()[0];
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "_id,_order,_user,details,label,collectDate");
        assert!(lines[1].ends_with(",L1,2024-03-05 09:30:00.000000"));
        assert!(lines[2].ends_with(",L2,"));
    }

    #[tokio::test]
    async fn test_direct_load_reorders_without_partitioning() {
        let fx = fixture(false);
        fx.write(
            "Marketing Spend (TRY).csv",
            "2025-09-21 (TRY),channel,2025-09-20 (TRY),2025-09-22 (TRY),2025-09-23 (TRY),\
             2025-09-24 (TRY),2025-09-25 (TRY),2025-09-26 (TRY),2025-09-27 (TRY)\n\
             2,search,1,3,4,5,6,7,8\n",
        );

        let report = fx
            .loader
            .load_direct("Marketing Spend (TRY).csv", "marketing_spend")
            .await
            .unwrap();
        assert_eq!(report.rows, 1);

        let (job, _, contents) = &fx.loaded()[0];
        assert!(job.time_partitioning.is_none());
        assert_eq!(
            contents.lines().nth(1).unwrap(),
            "search,1,2,3,4,5,6,7,8"
        );
    }

    #[tokio::test]
    async fn test_output_order_matches_registry_for_every_table() {
        let fx = fixture(false);
        let registry = SchemaRegistry::builtin();

        for name in registry.list() {
            let schema = registry.lookup(name).unwrap();
            let mut headers = schema.field_names();
            headers.reverse();
            let row = vec!["x"; headers.len()];
            let file = format!("{}.csv", name);
            fx.write(&file, &format!("{}\n{}\n", headers.join(","), row.join(",")));

            match schema.kind {
                crate::schema::TableKind::Partitioned => {
                    let field = if name == "shipments" { "collectDate" } else { "createdAt" };
                    fx.loader.load_partitioned(&file, name, field).await.unwrap();
                }
                crate::schema::TableKind::Reference => {
                    fx.loader.load_direct(&file, name).await.unwrap();
                }
            }

            let (_, _, contents) = fx.loaded().pop().unwrap();
            let header_line = contents.lines().next().unwrap().to_string();
            assert_eq!(header_line, schema.field_names().join(","), "{name}");
        }
    }

    #[tokio::test]
    async fn test_direct_load_drops_trailing_empty_columns() {
        let fx = fixture(false);
        fx.write("countries (1).csv", "_id,name,,\nc1,Turkey,,\n");

        let report = fx.loader.load_direct("countries (1).csv", "countries").await.unwrap();
        assert_eq!(report.rows, 1);
        assert_eq!(report.dropped_columns, vec!["", ""]);

        let (_, _, contents) = &fx.loaded()[0];
        assert_eq!(contents, "_id,name\nc1,Turkey\n");
    }

    #[tokio::test]
    async fn test_missing_required_column_aborts_before_load() {
        let fx = fixture(false);
        fx.write("countries (1).csv", "name\nTurkey\n");

        let result = fx.loader.load_direct("countries (1).csv", "countries").await;
        assert!(matches!(
            result,
            Err(PipelineError::MissingRequiredColumn { column, .. }) if column == "_id"
        ));
        assert!(fx.loaded().is_empty());
        assert!(fx.work_dir_is_empty());
    }

    #[tokio::test]
    async fn test_working_file_removed_after_success_and_failure() {
        let ok = fixture(false);
        ok.write("states (1).csv", "_country,_id,name\nc1,s1,Izmir\n");
        ok.loader.load_direct("states (1).csv", "states").await.unwrap();
        let (_, path, _) = &ok.loaded()[0];
        assert!(path.starts_with(ok.work.path()));
        assert!(!path.exists());
        assert!(ok.work_dir_is_empty());

        let failing = fixture(true);
        failing.write("states (1).csv", "_country,_id,name\nc1,s1,Izmir\n");
        let result = failing.loader.load_direct("states (1).csv", "states").await;
        assert!(matches!(result, Err(PipelineError::LoadJob { .. })));
        assert!(failing.work_dir_is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table_and_partition_field() {
        let fx = fixture(false);
        fx.write("payments.csv", "_id\np1\n");

        let result = fx.loader.load_direct("payments.csv", "payments").await;
        assert!(matches!(result, Err(PipelineError::UnknownTable(_))));

        let result = fx
            .loader
            .load_partitioned("payments.csv", "users", "updatedAt")
            .await;
        assert!(matches!(result, Err(PipelineError::InvalidPartitionField { .. })));
        assert!(fx.loaded().is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_file() {
        let fx = fixture(false);
        let result = fx.loader.load_direct("cities (1).csv", "cities").await;
        match result {
            Err(PipelineError::Io(message)) => assert!(message.contains("cities (1).csv")),
            other => panic!("expected I/O error, got {other:?}"),
        }
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(LoadStage::HeaderNormalized.to_string(), "header_normalized");
        assert_eq!(LoadStage::Failed.to_string(), "failed");
    }
}
