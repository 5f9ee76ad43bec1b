//! `AgentDispatcher` — turns each step action into a specialised agent prompt
//! and sends it to an [`LlmClient`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::llm::{LlmClient, TaskType};
use crate::{ActionDispatcher, ActionOutcome, DispatchContext, NodeError, StepAction};

/// One prompt-ready unit of work for an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTask {
    pub agent: &'static str,
    pub task: String,
    pub context: String,
    pub task_type: TaskType,
}

impl AgentTask {
    fn purpose(&self) -> &'static str {
        match self.task_type {
            TaskType::CodeAnalysis => "repository inspection and static code analysis",
            TaskType::TestGeneration => "automated test generation",
            TaskType::DockerGeneration => "container and Docker configuration",
            TaskType::Deployment => "deployment strategy and infrastructure",
            TaskType::Optimization => "performance and security optimization",
            TaskType::General => "DevOps automation",
        }
    }

    /// Render the prompt sent to the model.
    pub fn prompt(&self) -> String {
        format!(
            "You are {}, an AI agent specialized in {}.\n\nTask: {}\nContext: {}\n\nPlease provide a detailed, actionable response based on your specialization.",
            self.agent,
            self.purpose(),
            self.task,
            self.context
        )
    }
}

/// Map a step action to its agent task. `Generic` actions have none.
pub fn agent_task(action: &StepAction, ctx: &DispatchContext) -> Option<AgentTask> {
    let task = match action {
        StepAction::Clone(p) => {
            let url = if p.repository_url.is_empty() {
                ctx.parameters
                    .get("repository_url")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned()
            } else {
                p.repository_url.clone()
            };
            let context = if url.is_empty() { "local project".to_owned() } else { url.clone() };
            AgentTask {
                agent: "repo_agent",
                task: format!("Clone repository: {context} into '{}'", p.target_directory),
                context,
                task_type: TaskType::CodeAnalysis,
            }
        }
        StepAction::StaticAnalysis(p) => AgentTask {
            agent: "analysis_agent",
            task: "Perform static code analysis".into(),
            context: format!(
                "target={} include_security={} generate_report={}",
                p.target, p.include_security, p.generate_report
            ),
            task_type: TaskType::CodeAnalysis,
        },
        StepAction::GenerateTests(p) => AgentTask {
            agent: "test_agent",
            task: "Generate comprehensive test suite".into(),
            context: format!(
                "framework={} coverage_threshold={}% generate_mocks={}",
                p.framework, p.coverage_threshold, p.generate_mocks
            ),
            task_type: TaskType::TestGeneration,
        },
        StepAction::GenerateDockerFiles(p) => AgentTask {
            agent: "docker_agent",
            task: "Generate Docker deployment configuration".into(),
            context: format!(
                "optimization_level={} include_kubernetes={} security_hardening={}",
                p.optimization_level, p.include_kubernetes, p.security_hardening
            ),
            task_type: TaskType::DockerGeneration,
        },
        StepAction::CreateDeploymentConfig(p) => AgentTask {
            agent: "deploy_agent",
            task: "Create deployment strategy".into(),
            context: format!(
                "target_platform={} environment={} scaling={}",
                p.target_platform, p.environment, p.scaling_config
            ),
            task_type: TaskType::Deployment,
        },
        StepAction::OptimizeCodebase(p) => AgentTask {
            agent: "optimizer_agent",
            task: "Optimize codebase performance".into(),
            context: format!(
                "performance_analysis={} security_review={} generate_recommendations={}",
                p.performance_analysis, p.security_review, p.generate_recommendations
            ),
            task_type: TaskType::Optimization,
        },
        StepAction::Generic(_) => return None,
    };
    Some(task)
}

/// Production dispatcher: every non-generic step becomes one LLM completion.
pub struct AgentDispatcher {
    client: Arc<dyn LlmClient>,
}

impl AgentDispatcher {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionDispatcher for AgentDispatcher {
    async fn dispatch(
        &self,
        action: &StepAction,
        ctx: &DispatchContext,
    ) -> Result<ActionOutcome, NodeError> {
        let Some(task) = agent_task(action, ctx) else {
            return Ok(ActionOutcome::succeeded(format!("{} completed successfully", ctx.step_name))
                .with_agent("generic"));
        };

        info!(step = %ctx.step_id, agent = task.agent, "dispatching agent task");
        let response = self
            .client
            .generate(&task.prompt(), &task.context, task.task_type)
            .await?;
        debug!(step = %ctx.step_id, provider = %response.provider, "agent task answered");

        if response.content.trim().is_empty() {
            return Ok(ActionOutcome::failed(format!("empty response from {}", response.provider))
                .with_agent(task.agent));
        }
        Ok(ActionOutcome::succeeded(response.content).with_agent(task.agent))
    }
}
