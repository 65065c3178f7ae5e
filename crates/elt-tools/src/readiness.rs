//! Data readiness check.

use std::path::Path;

use crate::error::PipelineError;

/// Verify every expected file exists in `dir`.
///
/// Logs each file as found or missing and fails with the exact list of
/// missing names.
pub fn check_readiness(dir: &Path, expected: &[&str]) -> Result<(), PipelineError> {
    tracing::info!(dir = %dir.display(), "Checking for CSV files");

    let mut missing = Vec::new();
    for file in expected {
        if dir.join(file).is_file() {
            tracing::info!(file, "File exists");
        } else {
            tracing::warn!(file, "File NOT FOUND");
            missing.push(file.to_string());
        }
    }

    tracing::info!(
        found = expected.len() - missing.len(),
        expected = expected.len(),
        "Readiness summary"
    );

    if missing.is_empty() {
        tracing::info!("All required CSV files are present");
        Ok(())
    } else {
        tracing::error!(missing = %missing.join(", "), "Missing files");
        Err(PipelineError::MissingFiles(missing))
    }
}
