//! External process execution.
//!
//! The transformation tool is an opaque process: it is given a command line
//! and a working directory, and judged only by its exit code.

mod shell;

pub use self::shell::ShellRunner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::PipelineError;

/// A command to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Command line, interpreted by the runner's shell.
    pub command: String,

    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl ProcessSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[cfg(test)]
    pub(crate) fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Exit code, -1 when terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// Returns true if the process exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert a non-zero exit into an `ExternalProcess` error for `step`.
    pub fn into_result(self, step: &str) -> Result<ProcessOutput, PipelineError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PipelineError::ExternalProcess {
                step: step.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external processes to completion.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `spec` and wait for it to exit. Only a failure to start or wait on
    /// the process is an error; a non-zero exit is reported in the output.
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, PipelineError>;
}
