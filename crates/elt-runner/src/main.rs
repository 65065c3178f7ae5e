//! ELT runner binary.
//!
//! Checks the raw exports, loads them into BigQuery and runs the dbt layers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use elt_tools::ingest::expected_files;
use elt_tools::{
    check_readiness, BigQueryConfig, BigQueryWarehouse, CsvLoader, DbtSettings, Ingestor,
    Pipeline, PipelineConfig, SchemaRegistry, ShellRunner, SOURCES,
};

#[derive(Parser, Debug)]
#[command(name = "elt-runner")]
#[command(version, about = "Raw data ELT runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Verify every raw CSV export is present
    Check,
    /// Load every raw CSV export into the warehouse
    Ingest,
    /// Run the whole pipeline: readiness, ingestion and dbt steps
    Run,
}

/// Overrides for the ELT_* environment variables.
#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Directory holding the raw CSV exports (ELT_RAW_DATA_DIR)
    #[arg(long, global = true)]
    raw_data_dir: Option<PathBuf>,

    /// GCP project id (ELT_GCP_PROJECT_ID)
    #[arg(long, global = true)]
    project_id: Option<String>,

    /// Target dataset id (ELT_BQ_DATASET_ID)
    #[arg(long, global = true)]
    dataset_id: Option<String>,

    /// Directory for working files (ELT_WORK_DIR)
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// dbt project directory (ELT_DBT_PROJECT_DIR)
    #[arg(long, global = true)]
    dbt_project_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn get(&self, key: &str) -> Option<String> {
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
        match key {
            "ELT_RAW_DATA_DIR" => path(&self.raw_data_dir),
            "ELT_GCP_PROJECT_ID" => self.project_id.clone(),
            "ELT_BQ_DATASET_ID" => self.dataset_id.clone(),
            "ELT_WORK_DIR" => path(&self.work_dir),
            "ELT_DBT_PROJECT_DIR" => path(&self.dbt_project_dir),
            _ => None,
        }
    }

    /// Flags first, then the environment.
    fn load(&self) -> Result<PipelineConfig> {
        let config =
            PipelineConfig::from_lookup(|key| self.get(key).or_else(|| std::env::var(key).ok()))?;
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing() {
    let json = std::env::var("ELT_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,elt_tools=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn build_ingestor(config: &PipelineConfig) -> Ingestor {
    let warehouse = BigQueryWarehouse::new(
        BigQueryConfig::new(config.project_id.clone(), config.dataset_id.clone())
            .with_location(config.location.clone())
            .with_poll_interval(config.poll_interval),
    );
    let loader = CsvLoader::new(
        Arc::new(SchemaRegistry::builtin()),
        Arc::new(warehouse),
        config.raw_data_dir.clone(),
        config.work_dir.clone(),
    );
    Ingestor::new(loader)
}

// Steps run one at a time, a single thread is enough.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = cli.config.load()?;
    tracing::info!(
        raw_data_dir = %config.raw_data_dir.display(),
        project_id = %config.project_id,
        dataset_id = %config.dataset_id,
        location = %config.location,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Check => {
            check_readiness(&config.raw_data_dir, &expected_files(SOURCES))?;
        }
        Commands::Ingest => {
            let summary = build_ingestor(&config).run().await?;
            tracing::info!(
                tables = summary.reports.len(),
                rows = summary.total_rows(),
                "All files loaded"
            );
        }
        Commands::Run => {
            let dbt = DbtSettings::new(config.require_dbt_project_dir()?.clone())
                .with_bin(config.dbt_bin.clone());
            let pipeline = Pipeline::new(build_ingestor(&config), Arc::new(ShellRunner::new()), dbt);
            pipeline.run().await?;
        }
    }

    Ok(())
}
