//! BigQuery warehouse over the REST API.
//!
//! A load is a resumable media upload of the working file carrying the job
//! configuration, followed by polling `jobs.get` until the job is DONE.
//! See: https://cloud.google.com/bigquery/docs/reference/rest/v2/jobs/insert

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::auth::GcpAuth;
use crate::error::PipelineError;
use crate::warehouse::{
    LoadJob, LoadOutcome, SourceFormat, TimePartitioning, Warehouse, WriteDisposition,
};

/// BigQuery connection settings.
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub location: String,
    pub api_base: String,
    pub poll_interval: Duration,
}

impl BigQueryConfig {
    pub fn new(project_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            location: default_location(),
            api_base: default_api_base(),
            poll_interval: Duration::from_millis(1000),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn datasets_url(&self) -> String {
        format!("{}/bigquery/v2/projects/{}/datasets", self.api_base, self.project_id)
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=resumable",
            self.api_base, self.project_id
        )
    }

    fn job_url(&self, job_id: &str) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/jobs/{}?location={}",
            self.api_base, self.project_id, job_id, self.location
        )
    }
}

fn default_location() -> String {
    "US".to_string()
}

fn default_api_base() -> String {
    "https://bigquery.googleapis.com".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetResource<'a> {
    dataset_reference: DatasetReference<'a>,
    location: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobRequest<'a> {
    job_reference: JobReference<'a>,
    configuration: JobConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobReference<'a> {
    project_id: &'a str,
    job_id: &'a str,
    location: &'a str,
}

#[derive(Debug, Serialize)]
struct JobConfiguration<'a> {
    load: LoadConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration<'a> {
    destination_table: TableReference<'a>,
    schema: TableSchemaResource,
    source_format: SourceFormat,
    write_disposition: WriteDisposition,
    skip_leading_rows: u32,
    ignore_unknown_values: bool,
    allow_quoted_newlines: bool,
    autodetect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_partitioning: Option<&'a TimePartitioning>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
    table_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TableSchemaResource {
    fields: Vec<FieldResource>,
}

#[derive(Debug, Serialize)]
struct FieldResource {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    mode: &'static str,
}

/// Subset of the Job resource needed to follow a load.
#[derive(Debug, Deserialize)]
struct JobResource {
    status: JobStatus,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    #[serde(default)]
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    // int64 values are JSON strings in the REST API.
    #[serde(default)]
    output_rows: Option<String>,
}

impl JobStatus {
    fn is_done(&self) -> bool {
        self.state == "DONE"
    }

    fn failure_message(&self) -> Option<String> {
        let error = self.error_result.as_ref()?;
        let mut message = match &error.reason {
            Some(reason) => format!("{}: {}", reason, error.message),
            None => error.message.clone(),
        };
        for detail in self.errors.iter().filter(|e| e.message != error.message) {
            message.push_str("; ");
            message.push_str(&detail.message);
        }
        Some(message)
    }
}

impl JobResource {
    fn output_rows(&self) -> Option<u64> {
        self.statistics
            .as_ref()?
            .load
            .as_ref()?
            .output_rows
            .as_deref()?
            .parse()
            .ok()
    }
}

/// BigQuery warehouse client.
pub struct BigQueryWarehouse {
    client: Client,
    auth: GcpAuth,
    config: BigQueryConfig,
}

impl BigQueryWarehouse {
    /// Create a new BigQuery warehouse client.
    pub fn new(config: BigQueryConfig) -> Self {
        Self {
            client: Client::new(),
            auth: GcpAuth::new(),
            config,
        }
    }

    fn job_request<'a>(&'a self, job: &'a LoadJob, job_id: &'a str) -> JobRequest<'a> {
        JobRequest {
            job_reference: JobReference {
                project_id: &self.config.project_id,
                job_id,
                location: &self.config.location,
            },
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    destination_table: TableReference {
                        project_id: &self.config.project_id,
                        dataset_id: &self.config.dataset_id,
                        table_id: &job.table,
                    },
                    schema: TableSchemaResource {
                        fields: job
                            .schema
                            .iter()
                            .map(|f| FieldResource {
                                name: f.name.to_string(),
                                field_type: f.field_type.to_string(),
                                mode: f.mode(),
                            })
                            .collect(),
                    },
                    source_format: job.source_format,
                    write_disposition: job.write_disposition,
                    skip_leading_rows: job.skip_leading_rows,
                    ignore_unknown_values: job.ignore_unknown_values,
                    allow_quoted_newlines: job.allow_quoted_newlines,
                    autodetect: false,
                    time_partitioning: job.time_partitioning.as_ref(),
                },
            },
        }
    }

    async fn start_upload(&self, token: &str, body: &JobRequest<'_>, table: &str) -> Result<String, PipelineError> {
        let response = self
            .client
            .post(self.config.upload_url())
            .bearer_auth(token)
            .header("X-Upload-Content-Type", "application/octet-stream")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(load_error(table, response).await);
        }

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::LoadJob {
                table: table.to_string(),
                message: "upload session has no Location header".to_string(),
            })
    }

    async fn get_job(&self, job_id: &str) -> Result<JobResource, PipelineError> {
        let token = self.auth.bigquery_token().await?;
        let response = self
            .client
            .get(self.config.job_url(job_id))
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Outcome of a dataset insert that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatasetInsert {
    Created,
    AlreadyExists,
}

/// Map a dataset insert status. 409 means the dataset is already there, so
/// repeated runs succeed. `None` is a failure.
fn dataset_insert_outcome(status: StatusCode) -> Option<DatasetInsert> {
    match status {
        StatusCode::CONFLICT => Some(DatasetInsert::AlreadyExists),
        status if status.is_success() => Some(DatasetInsert::Created),
        _ => None,
    }
}

/// Poll until the job is DONE, then turn a job-level error into a
/// `LoadJob` error for `table`.
async fn wait_for_job<F, Fut>(
    table: &str,
    first: JobResource,
    interval: Duration,
    mut poll: F,
) -> Result<JobResource, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobResource, PipelineError>>,
{
    let mut resource = first;
    while !resource.status.is_done() {
        tokio::time::sleep(interval).await;
        resource = poll().await?;
        tracing::trace!(table, state = %resource.status.state, "Polled load job");
    }

    match resource.status.failure_message() {
        Some(message) => Err(PipelineError::LoadJob {
            table: table.to_string(),
            message,
        }),
        None => Ok(resource),
    }
}

async fn load_error(table: &str, response: reqwest::Response) -> PipelineError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    PipelineError::LoadJob {
        table: table.to_string(),
        message: format!("HTTP {}: {}", status, body),
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn ensure_dataset(&self) -> Result<(), PipelineError> {
        let token = self.auth.bigquery_token().await?;
        let body = DatasetResource {
            dataset_reference: DatasetReference {
                project_id: &self.config.project_id,
                dataset_id: &self.config.dataset_id,
            },
            location: &self.config.location,
        };

        let response = self
            .client
            .post(self.config.datasets_url())
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        match dataset_insert_outcome(status) {
            Some(DatasetInsert::AlreadyExists) => {
                tracing::debug!(dataset = %self.config.dataset_id, "Dataset already exists");
                Ok(())
            }
            Some(DatasetInsert::Created) => {
                tracing::info!(
                    dataset = %self.config.dataset_id,
                    location = %self.config.location,
                    "Dataset created"
                );
                Ok(())
            }
            None => {
                let text = response.text().await.unwrap_or_default();
                Err(PipelineError::Http(format!(
                    "Failed to create dataset {}: HTTP {}: {}",
                    self.config.dataset_id, status, text
                )))
            }
        }
    }

    async fn load(&self, job: &LoadJob, source: &Path) -> Result<LoadOutcome, PipelineError> {
        let token = self.auth.bigquery_token().await?;
        let job_id = format!("elt_{}_{}", job.table, uuid::Uuid::new_v4().simple());
        let request = self.job_request(job, &job_id);

        let session_url = self.start_upload(&token, &request, &job.table).await?;

        let data = tokio::fs::read(source).await?;
        tracing::debug!(table = %job.table, job_id = %job_id, bytes = data.len(), "Uploading working file");

        let response = self
            .client
            .put(&session_url)
            .bearer_auth(&token)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(load_error(&job.table, response).await);
        }

        let first: JobResource = response.json().await?;
        let job_ref: &str = &job_id;
        let resource = wait_for_job(&job.table, first, self.config.poll_interval, move || {
            self.get_job(job_ref)
        })
        .await?;

        Ok(LoadOutcome {
            output_rows: resource.output_rows(),
            job_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use std::collections::VecDeque;

    fn job(value: serde_json::Value) -> JobResource {
        serde_json::from_value(value).unwrap()
    }

    fn warehouse() -> BigQueryWarehouse {
        BigQueryWarehouse::new(BigQueryConfig::new("data-pipeline", "raw_data"))
    }

    #[test]
    fn test_config_urls() {
        let config = BigQueryConfig::new("proj", "raw").with_location("EU");
        assert_eq!(
            config.datasets_url(),
            "https://bigquery.googleapis.com/bigquery/v2/projects/proj/datasets"
        );
        assert_eq!(
            config.upload_url(),
            "https://bigquery.googleapis.com/upload/bigquery/v2/projects/proj/jobs?uploadType=resumable"
        );
        assert_eq!(
            config.job_url("j1"),
            "https://bigquery.googleapis.com/bigquery/v2/projects/proj/jobs/j1?location=EU"
        );
    }

    #[test]
    fn test_partitioned_job_request() {
        let registry = SchemaRegistry::builtin();
        let job = LoadJob::new(registry.lookup("users").unwrap()).partitioned_by("createdAt");
        let wh = warehouse();

        let value = serde_json::to_value(wh.job_request(&job, "elt_users_1")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "jobReference": {"projectId": "data-pipeline", "jobId": "elt_users_1", "location": "US"},
                "configuration": {"load": {
                    "destinationTable": {"projectId": "data-pipeline", "datasetId": "raw_data", "tableId": "users"},
                    "schema": {"fields": [
                        {"name": "_id", "type": "STRING", "mode": "REQUIRED"},
                        {"name": "createdAt", "type": "TIMESTAMP", "mode": "NULLABLE"}
                    ]},
                    "sourceFormat": "CSV",
                    "writeDisposition": "WRITE_TRUNCATE",
                    "skipLeadingRows": 1,
                    "ignoreUnknownValues": true,
                    "allowQuotedNewlines": true,
                    "autodetect": false,
                    "timePartitioning": {"type": "DAY", "field": "createdAt"}
                }}
            })
        );
    }

    #[test]
    fn test_direct_job_has_no_partitioning() {
        let registry = SchemaRegistry::builtin();
        let job = LoadJob::new(registry.lookup("countries").unwrap());
        let wh = warehouse();

        let value = serde_json::to_value(wh.job_request(&job, "j")).unwrap();
        assert!(value["configuration"]["load"].get("timePartitioning").is_none());
    }

    #[test]
    fn test_job_status_done_with_error() {
        let resource: JobResource = serde_json::from_value(serde_json::json!({
            "status": {
                "state": "DONE",
                "errorResult": {"reason": "invalid", "message": "Error while reading data"},
                "errors": [
                    {"reason": "invalid", "message": "Error while reading data"},
                    {"reason": "invalid", "message": "Row 3: Could not parse 'abc' as TIMESTAMP"}
                ]
            }
        }))
        .unwrap();

        assert!(resource.status.is_done());
        assert_eq!(
            resource.status.failure_message().unwrap(),
            "invalid: Error while reading data; Row 3: Could not parse 'abc' as TIMESTAMP"
        );
    }

    #[test]
    fn test_job_status_success_rows() {
        let resource: JobResource = serde_json::from_value(serde_json::json!({
            "status": {"state": "DONE"},
            "statistics": {"load": {"outputRows": "42"}}
        }))
        .unwrap();

        assert!(resource.status.failure_message().is_none());
        assert_eq!(resource.output_rows(), Some(42));

        let running: JobResource =
            serde_json::from_value(serde_json::json!({"status": {"state": "RUNNING"}})).unwrap();
        assert!(!running.status.is_done());
        assert_eq!(running.output_rows(), None);
    }

    #[test]
    fn test_dataset_insert_conflict_is_not_an_error() {
        assert_eq!(
            dataset_insert_outcome(StatusCode::CONFLICT),
            Some(DatasetInsert::AlreadyExists)
        );
        assert_eq!(dataset_insert_outcome(StatusCode::OK), Some(DatasetInsert::Created));
        assert_eq!(dataset_insert_outcome(StatusCode::FORBIDDEN), None);
        assert_eq!(dataset_insert_outcome(StatusCode::NOT_FOUND), None);
    }

    #[tokio::test]
    async fn test_wait_for_job_polls_until_done_with_error() {
        let mut responses = VecDeque::from(vec![
            job(serde_json::json!({"status": {"state": "RUNNING"}})),
            job(serde_json::json!({
                "status": {
                    "state": "DONE",
                    "errorResult": {"reason": "invalid", "message": "Error while reading data"}
                }
            })),
        ]);
        let mut polls = 0;

        let result = wait_for_job(
            "orders",
            job(serde_json::json!({"status": {"state": "PENDING"}})),
            Duration::ZERO,
            || {
                polls += 1;
                let next = responses.pop_front().unwrap();
                async move { Ok(next) }
            },
        )
        .await;

        match result {
            Err(PipelineError::LoadJob { table, message }) => {
                assert_eq!(table, "orders");
                assert_eq!(message, "invalid: Error while reading data");
            }
            other => panic!("expected load job failure, got {other:?}"),
        }
        assert_eq!(polls, 2);
    }

    #[tokio::test]
    async fn test_wait_for_job_done_without_polling() {
        let mut polls = 0;
        let resource = wait_for_job(
            "users",
            job(serde_json::json!({
                "status": {"state": "DONE"},
                "statistics": {"load": {"outputRows": "7"}}
            })),
            Duration::ZERO,
            || {
                polls += 1;
                async { Err(PipelineError::Http("unexpected poll".to_string())) }
            },
        )
        .await
        .unwrap();

        assert_eq!(resource.output_rows(), Some(7));
        assert_eq!(polls, 0);
    }

    #[tokio::test]
    async fn test_wait_for_job_propagates_poll_error() {
        let result = wait_for_job(
            "users",
            job(serde_json::json!({"status": {"state": "RUNNING"}})),
            Duration::ZERO,
            || async { Err(PipelineError::Http("HTTP 503".to_string())) },
        )
        .await;

        assert!(matches!(result, Err(PipelineError::Http(msg)) if msg == "HTTP 503"));
    }
}
