//! Step actions — the closed set of operations a pipeline step can request.
//!
//! Each variant carries its own parameter payload. Dispatchers `match` on
//! [`StepAction`] exhaustively, so adding a variant is a compile error until
//! every dispatcher handles it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// StepKind
// ---------------------------------------------------------------------------

/// Coarse category of a step, derived from its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Repository,
    Analysis,
    Testing,
    Containerization,
    Deployment,
    Optimization,
    General,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::Analysis => "analysis",
            Self::Testing => "testing",
            Self::Containerization => "containerization",
            Self::Deployment => "deployment",
            Self::Optimization => "optimization",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Parameter payloads
// ---------------------------------------------------------------------------

/// Parameters for cloning the target repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneParams {
    /// Empty means "take `repository_url` from the run parameters".
    pub repository_url: String,
    pub target_directory: String,
}

impl Default for CloneParams {
    fn default() -> Self {
        Self {
            repository_url: String::new(),
            target_directory: "workspace".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    pub target: String,
    pub include_security: bool,
    pub generate_report: bool,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            target: "workspace".into(),
            include_security: true,
            generate_report: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestParams {
    pub framework: String,
    /// Percentage, 0–100.
    pub coverage_threshold: u8,
    pub generate_mocks: bool,
}

impl Default for TestParams {
    fn default() -> Self {
        Self {
            framework: "pytest".into(),
            coverage_threshold: 80,
            generate_mocks: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerParams {
    pub optimization_level: String,
    pub include_kubernetes: bool,
    pub security_hardening: bool,
}

impl Default for DockerParams {
    fn default() -> Self {
        Self {
            optimization_level: "production".into(),
            include_kubernetes: true,
            security_hardening: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentParams {
    pub target_platform: String,
    pub environment: String,
    pub scaling_config: String,
}

impl Default for DeploymentParams {
    fn default() -> Self {
        Self {
            target_platform: "kubernetes".into(),
            environment: "production".into(),
            scaling_config: "auto".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeParams {
    pub performance_analysis: bool,
    pub security_review: bool,
    pub generate_recommendations: bool,
}

impl Default for OptimizeParams {
    fn default() -> Self {
        Self {
            performance_analysis: true,
            security_review: true,
            generate_recommendations: true,
        }
    }
}

// ---------------------------------------------------------------------------
// StepAction
// ---------------------------------------------------------------------------

/// The concrete operation a step performs, with its typed parameters.
///
/// Serialised as `{ "action": "<name>", "parameters": { … } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "parameters", rename_all = "snake_case")]
pub enum StepAction {
    Clone(CloneParams),
    StaticAnalysis(AnalysisParams),
    GenerateTests(TestParams),
    GenerateDockerFiles(DockerParams),
    CreateDeploymentConfig(DeploymentParams),
    OptimizeCodebase(OptimizeParams),
    /// Free-form step whose parameters are opaque to every dispatcher.
    Generic(Map<String, Value>),
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Clone(_) => StepKind::Repository,
            Self::StaticAnalysis(_) => StepKind::Analysis,
            Self::GenerateTests(_) => StepKind::Testing,
            Self::GenerateDockerFiles(_) => StepKind::Containerization,
            Self::CreateDeploymentConfig(_) => StepKind::Deployment,
            Self::OptimizeCodebase(_) => StepKind::Optimization,
            Self::Generic(_) => StepKind::General,
        }
    }

    /// Wire name of the action (the `action` tag).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clone(_) => "clone",
            Self::StaticAnalysis(_) => "static_analysis",
            Self::GenerateTests(_) => "generate_tests",
            Self::GenerateDockerFiles(_) => "generate_docker_files",
            Self::CreateDeploymentConfig(_) => "create_deployment_config",
            Self::OptimizeCodebase(_) => "optimize_codebase",
            Self::Generic(_) => "generic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_serialises_with_tag_and_parameters() {
        let action = StepAction::GenerateTests(TestParams::default());
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action"], "generate_tests");
        assert_eq!(value["parameters"]["framework"], "pytest");
        assert_eq!(value["parameters"]["coverage_threshold"], 80);
    }

    #[test]
    fn missing_parameter_fields_take_defaults() {
        let action: StepAction = serde_json::from_value(json!({
            "action": "clone",
            "parameters": { "repository_url": "https://example.com/repo.git" }
        }))
        .unwrap();

        match action {
            StepAction::Clone(p) => {
                assert_eq!(p.repository_url, "https://example.com/repo.git");
                assert_eq!(p.target_directory, "workspace");
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let parsed = serde_json::from_value::<StepAction>(json!({
            "action": "launch_rockets",
            "parameters": {}
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn kind_follows_action() {
        assert_eq!(StepAction::Clone(CloneParams::default()).kind(), StepKind::Repository);
        assert_eq!(StepAction::Generic(Map::new()).kind(), StepKind::General);
        assert_eq!(
            StepAction::CreateDeploymentConfig(DeploymentParams::default()).kind().to_string(),
            "deployment"
        );
    }
}
