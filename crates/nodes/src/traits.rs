//! The `ActionDispatcher` trait — the contract every step handler must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{NodeError, StepAction};

/// Run-time overrides supplied by whoever starts a pipeline run.
pub type RunParameters = Map<String, Value>;

/// Shared context passed to every dispatch.
///
/// Defined here (in the nodes crate) so both the engine and individual
/// dispatchers can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// ID of the pipeline being run.
    pub pipeline_id: uuid::Uuid,
    /// ID of the current execution run.
    pub execution_id: uuid::Uuid,
    /// ID of the step being dispatched.
    pub step_id: String,
    pub step_name: String,
    /// 1-based attempt number (greater than 1 on retries).
    pub attempt: u32,
    /// Run-time overrides supplied when the execution was triggered.
    pub parameters: RunParameters,
}

/// Structured result of one dispatch.
///
/// `success: false` is an ordinary, expected failure. Errors that prevent a
/// result from being produced at all come back as [`NodeError`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock seconds spent. The engine overwrites this with its own
    /// measurement, so handlers may leave it at zero.
    #[serde(default)]
    pub duration_secs: f64,
    /// Which agent or handler produced the outcome, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl ActionOutcome {
    pub fn succeeded(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
            duration_secs: 0.0,
            agent: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error.into()),
            duration_secs: 0.0,
            agent: None,
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

/// Performs the work behind a step.
///
/// Implementations must not block forever; the engine bounds each call with
/// the step's timeout when one is configured.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        action: &StepAction,
        ctx: &DispatchContext,
    ) -> Result<ActionOutcome, NodeError>;
}
