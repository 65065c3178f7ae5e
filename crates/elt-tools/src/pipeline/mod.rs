//! Pipeline driver.
//!
//! Runs readiness, ingestion and the dbt steps strictly in sequence. The
//! first failing step stops the run, except source freshness tests whose
//! failures are logged as warnings.

mod steps;

pub use self::steps::{DbtCommand, FailurePolicy, PipelineStep, Selector, StepKind, TransformStep, STEPS};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::ingest::{expected_files, Ingestor};
use crate::process::{ProcessRunner, ProcessSpec};
use crate::readiness::check_readiness;
use crate::result::{PipelineReport, StepResult};

/// Where and how dbt is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbtSettings {
    pub project_dir: PathBuf,
    pub bin: String,
}

impl DbtSettings {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            bin: "dbt".to_string(),
        }
    }

    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.bin = bin.into();
        self
    }
}

pub struct Pipeline {
    ingestor: Ingestor,
    runner: Arc<dyn ProcessRunner>,
    dbt: DbtSettings,
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn new(ingestor: Ingestor, runner: Arc<dyn ProcessRunner>, dbt: DbtSettings) -> Self {
        Self {
            ingestor,
            runner,
            dbt,
            steps: STEPS.to_vec(),
        }
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Run every step in order, then log the execution metrics.
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();

        for step in &self.steps {
            tracing::info!(step = step.id, "STEP: {}", step.title);
            let start = Instant::now();

            match self.run_step(step, start).await {
                Ok(result) => {
                    tracing::info!(
                        step = step.id,
                        status = %result.status,
                        duration_secs = result.duration.as_secs_f64(),
                        "{} completed",
                        step.title
                    );
                    report.push(result);
                }
                Err(e) => {
                    tracing::error!(step = step.id, error = %e, "{} FAILED - pipeline stopping", step.title);
                    report.push(StepResult::failed(step.id, step.title, start.elapsed(), e.to_string()));
                    log_failure(&report);
                    return Err(e);
                }
            }
        }

        log_execution_metrics(&report);
        Ok(report)
    }

    async fn run_step(&self, step: &PipelineStep, start: Instant) -> Result<StepResult, PipelineError> {
        match step.kind {
            StepKind::Readiness => {
                let expected = expected_files(self.ingestor.sources());
                check_readiness(self.ingestor.loader().raw_data_dir(), &expected)?;
                // validation only, not timed
                Ok(StepResult::success(step.id, step.title, Duration::ZERO))
            }
            StepKind::Ingestion => {
                let summary = self.ingestor.run().await?;
                Ok(StepResult::success(step.id, step.title, summary.duration))
            }
            StepKind::Transform(transform) => self.run_transform(step, &transform, start).await,
        }
    }

    async fn run_transform(
        &self,
        step: &PipelineStep,
        transform: &TransformStep,
        start: Instant,
    ) -> Result<StepResult, PipelineError> {
        let command = transform.command_line(&self.dbt.bin);
        tracing::info!(step = step.id, command = %command, "Running dbt");

        let spec = ProcessSpec::new(command).in_dir(&self.dbt.project_dir);
        let output = self.runner.run(&spec).await?;
        if !output.stdout.is_empty() {
            tracing::debug!(step = step.id, stdout = %output.stdout, "dbt output");
        }

        match output.into_result(step.id) {
            Ok(_) => Ok(StepResult::success(step.id, step.title, start.elapsed())),
            Err(e) if transform.on_failure == FailurePolicy::Warn => {
                tracing::warn!(step = step.id, error = %e, "Source test warnings noted, continuing");
                Ok(StepResult::warning(step.id, step.title, start.elapsed(), e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

fn log_execution_metrics(report: &PipelineReport) {
    tracing::info!("PIPELINE EXECUTION METRICS");
    for step in &report.steps {
        tracing::info!(
            step = %step.step,
            status = %step.status,
            duration_secs = step.duration.as_secs_f64(),
            "{}",
            step.title
        );
    }
    let warnings = report.warnings().count();
    tracing::info!(
        steps = report.steps.len(),
        warnings,
        total_secs = report.total_duration().as_secs_f64(),
        "PIPELINE COMPLETED SUCCESSFULLY"
    );
}

fn log_failure(report: &PipelineReport) {
    if let Some(failed) = report.failed_step() {
        tracing::error!(
            step = %failed.step,
            completed = report.steps.len() - 1,
            elapsed_secs = report.total_duration().as_secs_f64(),
            "PIPELINE FAILED"
        );
    }
}
