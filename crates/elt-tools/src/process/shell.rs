//! Shell command runner.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

use crate::error::PipelineError;
use crate::process::{ProcessOutput, ProcessRunner, ProcessSpec};

/// Runs commands through `<shell> -c`, capturing stdout and stderr.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    /// Create a runner using bash.
    pub fn new() -> Self {
        Self::with_shell("bash")
    }

    /// Create a runner using another shell.
    pub(crate) fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, PipelineError> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&spec.command);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::info!(command = %spec.command, cwd = ?spec.cwd, "Executing");

        let output = cmd
            .output()
            .await
            .map_err(|e| PipelineError::Process(format!("Failed to run '{}': {}", spec.command, e)))?;

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_echo() {
        let runner = ShellRunner::new();
        let output = runner.run(&ProcessSpec::new("echo 'hello world'")).await.unwrap();

        assert!(output.is_success());
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("hello world"));
    }

    #[tokio::test]
    async fn test_shell_exit_code() {
        let runner = ShellRunner::new();
        let output = runner.run(&ProcessSpec::new("exit 42")).await.unwrap();

        assert!(!output.is_success());
        assert_eq!(output.exit_code, 42);
    }

    #[tokio::test]
    async fn test_shell_stderr() {
        let runner = ShellRunner::new();
        let output = runner.run(&ProcessSpec::new("echo 'error' >&2")).await.unwrap();

        assert!(output.is_success());
        assert!(output.stderr.contains("error"));
    }

    #[tokio::test]
    async fn test_shell_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::new("echo $MY_VAR; pwd")
            .in_dir(dir.path())
            .with_env("MY_VAR", "my_value");

        let output = ShellRunner::new().run(&spec).await.unwrap();
        assert!(output.stdout.contains("my_value"));

        let name = dir.path().file_name().unwrap().to_str().unwrap();
        assert!(output.stdout.contains(name));
    }

    #[tokio::test]
    async fn test_missing_shell_is_process_error() {
        let runner = ShellRunner::with_shell("/nonexistent/shell");
        let result = runner.run(&ProcessSpec::new("true")).await;
        assert!(matches!(result, Err(PipelineError::Process(_))));
    }
}
