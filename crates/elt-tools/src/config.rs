//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::PipelineError;

/// Pipeline configuration, validated at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Directory holding the raw CSV exports.
    pub raw_data_dir: PathBuf,

    /// Directory for transient working files.
    pub work_dir: PathBuf,

    /// GCP project id.
    pub project_id: String,

    /// Target dataset id.
    pub dataset_id: String,

    /// Dataset location.
    pub location: String,

    /// dbt project directory. Only needed for transformation steps.
    pub dbt_project_dir: Option<PathBuf>,

    /// dbt executable.
    pub dbt_bin: String,

    /// Interval between load-job status polls.
    pub poll_interval: Duration,
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| PipelineError::Configuration(format!("{} is not set", key)))
        };

        let poll_ms: u64 = match var("ELT_BQ_POLL_INTERVAL_MS") {
            Some(raw) => raw.parse().map_err(|_| {
                PipelineError::Configuration(format!("ELT_BQ_POLL_INTERVAL_MS is not a number: {}", raw))
            })?,
            None => 1000,
        };

        Ok(Self {
            raw_data_dir: PathBuf::from(required("ELT_RAW_DATA_DIR")?),
            work_dir: var("ELT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            project_id: required("ELT_GCP_PROJECT_ID")?,
            dataset_id: var("ELT_BQ_DATASET_ID").unwrap_or_else(|| "raw_data".to_string()),
            location: var("ELT_BQ_LOCATION").unwrap_or_else(|| "US".to_string()),
            dbt_project_dir: var("ELT_DBT_PROJECT_DIR").map(PathBuf::from),
            dbt_bin: var("ELT_DBT_BIN").unwrap_or_else(|| "dbt".to_string()),
            poll_interval: Duration::from_millis(poll_ms),
        })
    }

    /// Check that configured directories exist and the poll interval is
    /// non-zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let dirs = [
            ("raw data directory", Some(&self.raw_data_dir)),
            ("work directory", Some(&self.work_dir)),
            ("dbt project directory", self.dbt_project_dir.as_ref()),
        ];
        for (label, dir) in dirs {
            if let Some(dir) = dir {
                if !dir.is_dir() {
                    return Err(PipelineError::Configuration(format!(
                        "{} {} does not exist",
                        label,
                        dir.display()
                    )));
                }
            }
        }

        if self.project_id.is_empty() || self.dataset_id.is_empty() {
            return Err(PipelineError::Configuration(
                "project id and dataset id must not be empty".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(PipelineError::Configuration(
                "ELT_BQ_POLL_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// dbt project directory, required by transformation steps.
    pub fn require_dbt_project_dir(&self) -> Result<&PathBuf, PipelineError> {
        self.dbt_project_dir
            .as_ref()
            .ok_or_else(|| PipelineError::Configuration("ELT_DBT_PROJECT_DIR is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("ELT_RAW_DATA_DIR", "/data/raw"),
            ("ELT_GCP_PROJECT_ID", "data-pipeline-project"),
        ]))
        .unwrap();

        assert_eq!(config.raw_data_dir, PathBuf::from("/data/raw"));
        assert_eq!(config.dataset_id, "raw_data");
        assert_eq!(config.location, "US");
        assert_eq!(config.dbt_bin, "dbt");
        assert_eq!(config.dbt_project_dir, None);
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.work_dir, std::env::temp_dir());
    }

    #[test]
    fn test_missing_required_var() {
        let result = PipelineConfig::from_lookup(lookup(&[("ELT_RAW_DATA_DIR", "/data/raw")]));
        match result {
            Err(PipelineError::Configuration(msg)) => assert!(msg.contains("ELT_GCP_PROJECT_ID")),
            other => panic!("expected configuration error, got {other:?}"),
        }

        let result = PipelineConfig::from_lookup(lookup(&[
            ("ELT_RAW_DATA_DIR", "  "),
            ("ELT_GCP_PROJECT_ID", "p"),
        ]));
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_invalid_poll_interval() {
        let result = PipelineConfig::from_lookup(lookup(&[
            ("ELT_RAW_DATA_DIR", "/data/raw"),
            ("ELT_GCP_PROJECT_ID", "p"),
            ("ELT_BQ_POLL_INTERVAL_MS", "soon"),
        ]));
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_validate_directories() {
        let raw = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::from_lookup(lookup(&[
            ("ELT_RAW_DATA_DIR", raw.path().to_str().unwrap()),
            ("ELT_WORK_DIR", raw.path().to_str().unwrap()),
            ("ELT_GCP_PROJECT_ID", "p"),
        ]))
        .unwrap();
        assert!(config.validate().is_ok());
        assert!(config.require_dbt_project_dir().is_err());

        config.dbt_project_dir = Some(raw.path().join("dbt"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dbt project directory"));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let raw = tempfile::tempdir().unwrap();
        let config = PipelineConfig::from_lookup(lookup(&[
            ("ELT_RAW_DATA_DIR", raw.path().to_str().unwrap()),
            ("ELT_WORK_DIR", raw.path().to_str().unwrap()),
            ("ELT_GCP_PROJECT_ID", "p"),
            ("ELT_BQ_POLL_INTERVAL_MS", "0"),
        ]))
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ELT_BQ_POLL_INTERVAL_MS"));
    }
}
