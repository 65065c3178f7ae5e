//! Step result types threaded through a pipeline run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status of a finished step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Step completed successfully.
    Success,
    /// Step failed, but its failures are downgraded to warnings.
    Warning,
    /// Step failed and stopped the run.
    Failed,
}

impl StepStatus {
    /// Returns true unless the step stopped the run.
    pub fn is_ok(&self) -> bool {
        !matches!(self, StepStatus::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Warning => write!(f, "warning"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step id, e.g. `step_1_data_ingestion`.
    pub step: String,

    /// Human-readable step title.
    pub title: String,

    pub status: StepStatus,

    /// Step duration. Zero for validation-only steps.
    pub duration: Duration,

    /// Warning or error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepResult {
    pub fn success(step: impl Into<String>, title: impl Into<String>, duration: Duration) -> Self {
        Self {
            step: step.into(),
            title: title.into(),
            status: StepStatus::Success,
            duration,
            message: None,
        }
    }

    pub fn warning(
        step: impl Into<String>,
        title: impl Into<String>,
        duration: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: StepStatus::Warning,
            message: Some(message.into()),
            ..Self::success(step, title, duration)
        }
    }

    pub fn failed(
        step: impl Into<String>,
        title: impl Into<String>,
        duration: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: StepStatus::Failed,
            message: Some(message.into()),
            ..Self::success(step, title, duration)
        }
    }
}

/// Results of every step that ran, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub steps: Vec<StepResult>,
}

impl PipelineReport {
    pub fn push(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    /// Sum of step durations.
    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }

    /// Success only if no step stopped the run.
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_ok())
    }

    /// Steps that finished with downgraded failures.
    pub fn warnings(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.status == StepStatus::Warning)
    }

    /// The step that stopped the run, if any.
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    pub fn get(&self, step: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step == step)
    }
}
