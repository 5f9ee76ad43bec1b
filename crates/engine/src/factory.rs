//! Canned pipeline definitions.
//!
//! The standard DevOps flow is:
//!
//! ```text
//! step_1 clone ──┬── step_2 analyze ──┬── step_6 optimize
//!                │                    │
//!                ├── step_3 test      │
//!                │                    │
//!                └────────────────────┴── step_4 containerize ── step_5 deploy
//! ```
//!
//! Clone and containerization are critical (`abort` on failure); the other
//! stages may fail without stopping the run.

use chrono::Utc;

use nodes::action::{
    AnalysisParams, CloneParams, DeploymentParams, DockerParams, OptimizeParams, TestParams,
};
use nodes::StepAction;

use crate::models::{Routing, Step};

/// Name given to a freshly built standard pipeline.
pub fn standard_pipeline_name() -> String {
    format!("DevOps Pipeline {}", Utc::now().timestamp_millis())
}

pub fn standard_pipeline_description(repository_url: &str) -> String {
    let target = if repository_url.is_empty() { "local project" } else { repository_url };
    format!("Comprehensive DevOps pipeline for repository: {target}")
}

/// The six standard stages: fetch → analyze → test → containerize → deploy → optimize.
pub fn standard_steps(repository_url: &str) -> Vec<Step> {
    vec![
        Step::new(
            "step_1",
            "Repository Clone",
            StepAction::Clone(CloneParams {
                repository_url: repository_url.to_owned(),
                ..CloneParams::default()
            }),
        )
        .on_failure(Routing::Abort)
        .retries(2)
        .timeout(300),
        Step::new("step_2", "Code Analysis", StepAction::StaticAnalysis(AnalysisParams::default()))
            .depends_on(["step_1"]),
        Step::new("step_3", "Test Generation", StepAction::GenerateTests(TestParams::default()))
            .depends_on(["step_1"]),
        Step::new(
            "step_4",
            "Docker Configuration",
            StepAction::GenerateDockerFiles(DockerParams::default()),
        )
        .depends_on(["step_1", "step_2"])
        .on_failure(Routing::Abort),
        Step::new(
            "step_5",
            "Deployment Strategy",
            StepAction::CreateDeploymentConfig(DeploymentParams::default()),
        )
        .depends_on(["step_4"]),
        Step::new(
            "step_6",
            "Code Optimization",
            StepAction::OptimizeCodebase(OptimizeParams::default()),
        )
        .depends_on(["step_2"]),
    ]
}
