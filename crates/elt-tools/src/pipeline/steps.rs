//! Pipeline step definitions.

/// dbt subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbtCommand {
    Run,
    Test,
}

impl DbtCommand {
    fn as_str(&self) -> &'static str {
        match self {
            DbtCommand::Run => "run",
            DbtCommand::Test => "test",
        }
    }
}

/// Node selection for a dbt invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Select(&'static str),
    Exclude(&'static str),
}

/// What a non-zero exit means for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the pipeline.
    Abort,
    /// Log a warning and continue. Reserved for source freshness tests.
    Warn,
}

/// A dbt invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformStep {
    pub command: DbtCommand,
    pub selector: Selector,
    pub on_failure: FailurePolicy,
}

impl TransformStep {
    const fn run(selection: &'static str) -> Self {
        Self {
            command: DbtCommand::Run,
            selector: Selector::Select(selection),
            on_failure: FailurePolicy::Abort,
        }
    }

    const fn test(selector: Selector, on_failure: FailurePolicy) -> Self {
        Self {
            command: DbtCommand::Test,
            selector,
            on_failure,
        }
    }

    /// Full command line, run from the dbt project directory.
    pub fn command_line(&self, dbt_bin: &str) -> String {
        let (flag, value) = match self.selector {
            Selector::Select(v) => ("--select", v),
            Selector::Exclude(v) => ("--exclude", v),
        };
        format!(
            "{} {} {} {} --profiles-dir .",
            dbt_bin,
            self.command.as_str(),
            flag,
            value
        )
    }
}

/// What a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Readiness,
    Ingestion,
    Transform(TransformStep),
}

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStep {
    pub id: &'static str,
    pub title: &'static str,
    pub kind: StepKind,
}

const fn step(id: &'static str, title: &'static str, kind: StepKind) -> PipelineStep {
    PipelineStep { id, title, kind }
}

/// Steps in execution order.
pub const STEPS: &[PipelineStep] = &[
    step("step_0_data_readiness_check", "Data Readiness Check", StepKind::Readiness),
    step("step_1_data_ingestion", "Data Ingestion", StepKind::Ingestion),
    step(
        "step_2_source_freshness_tests",
        "Source Tests",
        StepKind::Transform(TransformStep::test(
            Selector::Select("staging.raw_sources"),
            FailurePolicy::Warn,
        )),
    ),
    step(
        "step_3_create_staging_models",
        "Staging Models Creation",
        StepKind::Transform(TransformStep::run("staging")),
    ),
    step(
        "step_4_test_staging_schema",
        "Staging Schema Tests",
        StepKind::Transform(TransformStep::test(
            Selector::Select("staging.staging_schema"),
            FailurePolicy::Abort,
        )),
    ),
    step(
        "step_5_create_intermediate_models",
        "Intermediate Models Creation",
        StepKind::Transform(TransformStep::run("intermediate")),
    ),
    step(
        "step_6_test_intermediate_models",
        "Intermediate Tests",
        StepKind::Transform(TransformStep::test(
            Selector::Select("intermediate"),
            FailurePolicy::Abort,
        )),
    ),
    step(
        "step_7_create_dimension_models",
        "Dimension Models Creation",
        StepKind::Transform(TransformStep::run("dims")),
    ),
    step(
        "step_8_create_fact_models",
        "Fact Models Creation",
        StepKind::Transform(TransformStep::run("facts")),
    ),
    step(
        "step_9_create_mart_models",
        "Mart Models Creation",
        StepKind::Transform(TransformStep::run("marts")),
    ),
    step(
        "step_10_all_data_quality_tests",
        "All Data Quality Tests",
        StepKind::Transform(TransformStep::test(
            Selector::Exclude("tag:source_test"),
            FailurePolicy::Abort,
        )),
    ),
];
