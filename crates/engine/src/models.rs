//! Core domain models for the pipeline engine.
//!
//! These types are the source of truth for what a pipeline and a run look
//! like in memory. They are serialised as-is into the JSON documents kept by
//! the `db` crate, so every field must survive a save/load round trip.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nodes::{ActionOutcome, RunParameters, StepAction, StepKind};

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// What the coordinator does after a step succeeds or fails.
///
/// Only `Abort` changes control flow. A named `Target` is kept so documents
/// round-trip, but the coordinator does not branch to it: execution continues
/// in resolver order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Routing {
    #[default]
    Continue,
    Abort,
    Target(String),
}

/// A blank value reads as `continue`, so hand-written documents that leave
/// the field empty are normalised to the canonical word on their next save.
/// Documents written by the store only ever hold `continue`, `abort` or a
/// target, and those round-trip unchanged.
impl From<String> for Routing {
    fn from(s: String) -> Self {
        match s.as_str() {
            "abort" => Self::Abort,
            "continue" | "" => Self::Continue,
            _ => Self::Target(s),
        }
    }
}

impl From<Routing> for String {
    fn from(r: Routing) -> Self {
        match r {
            Routing::Continue => "continue".into(),
            Routing::Abort => "abort".into(),
            Routing::Target(t) => t,
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier within this pipeline (referenced by `dependencies`).
    pub id: String,
    pub name: String,
    /// What to dispatch, with its typed parameters.
    pub action: StepAction,
    /// Steps that must be processed (whatever their outcome) before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub on_success: Routing,
    #[serde(default)]
    pub on_failure: Routing,
    /// Extra dispatch attempts after a failed one.
    #[serde(default)]
    pub retry_count: u32,
    /// Upper bound for one dispatch attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            action,
            dependencies: Vec::new(),
            on_success: Routing::Continue,
            on_failure: Routing::Continue,
            retry_count: 0,
            timeout_secs: None,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_success(mut self, routing: Routing) -> Self {
        self.on_success = routing;
        self
    }

    pub fn on_failure(mut self, routing: Routing) -> Self {
        self.on_failure = routing;
        self
    }

    pub fn retries(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Rough wall-clock cost of one step of the given kind, in seconds.
pub fn estimated_step_secs(kind: StepKind) -> u64 {
    match kind {
        StepKind::Repository => 60,
        StepKind::Analysis => 45,
        StepKind::Testing => 90,
        StepKind::Containerization => 30,
        StepKind::Deployment => 45,
        StepKind::Optimization => 60,
        StepKind::General => 30,
    }
}

/// Facts derived from the step list when the pipeline is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub total_steps: usize,
    pub estimated_duration_secs: u64,
    /// Distinct step kinds present, sorted.
    pub dependencies: Vec<StepKind>,
}

impl PipelineMetadata {
    pub fn for_steps(steps: &[Step]) -> Self {
        let kinds: BTreeSet<StepKind> = steps.iter().map(Step::kind).collect();
        Self {
            total_steps: steps.len(),
            estimated_duration_secs: steps.iter().map(|s| estimated_step_secs(s.kind())).sum(),
            dependencies: kinds.into_iter().collect(),
        }
    }
}

/// One line of a pipeline's run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub execution_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub duration_secs: f64,
}

/// A complete pipeline definition.
///
/// Everything except `execution_history` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub version: String,
    pub steps: Vec<Step>,
    pub metadata: PipelineMetadata,
    #[serde(default)]
    pub execution_history: Vec<HistoryEntry>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, description: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            created_at: Utc::now(),
            version: "1.0.0".into(),
            metadata: PipelineMetadata::for_steps(&steps),
            steps,
            execution_history: Vec::new(),
        }
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Lifecycle of one run. Every state but `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Error,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "error"     => Ok(Self::Error),
            other       => Err(format!("unknown execution status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
}

/// One entry of `steps_executed`, appended as each step finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    pub step_name: String,
    pub status: StepStatus,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
    /// Dispatch attempts made, retries included.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-step outcomes of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResults {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// IDs of steps that were processed, in execution order.
    pub completed_steps: Vec<String>,
    pub step_results: BTreeMap<String, ActionOutcome>,
    pub total_steps: usize,
}

impl StepResults {
    pub fn new(total_steps: usize) -> Self {
        Self {
            success: true,
            error: None,
            completed_steps: Vec::new(),
            step_results: BTreeMap::new(),
            total_steps,
        }
    }
}

/// The persisted trace of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    /// Back-reference only; the pipeline may since have been edited or deleted.
    pub pipeline_name: String,
    pub pipeline_id: Uuid,
    #[serde(default)]
    pub parameters: RunParameters,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub current_step: Option<String>,
    pub steps_executed: Vec<StepRecord>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub results: Option<StepResults>,
}

impl ExecutionRecord {
    /// A fresh record in `Running` state.
    pub fn start(pipeline: &Pipeline, parameters: RunParameters) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            pipeline_name: pipeline.name.clone(),
            pipeline_id: pipeline.id,
            parameters,
            started_at: Utc::now(),
            finished_at: None,
            duration_secs: None,
            current_step: None,
            steps_executed: Vec::new(),
            status: ExecutionStatus::Running,
            errors: Vec::new(),
            results: None,
        }
    }

    /// Move to a terminal state and stamp the end time.
    pub fn finish(&mut self, status: ExecutionStatus, elapsed: Duration) {
        debug_assert!(status.is_terminal(), "finish() needs a terminal status");
        debug_assert!(!self.status.is_terminal(), "record already finalised");
        self.status = status;
        self.current_step = None;
        self.finished_at = Some(Utc::now());
        self.duration_secs = Some(elapsed.as_secs_f64());
    }

    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            execution_id: self.execution_id,
            timestamp: self.finished_at.unwrap_or(self.started_at),
            status: self.status,
            duration_secs: self.duration_secs.unwrap_or_default(),
        }
    }
}

/// What `execute_pipeline` hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub execution_id: Option<Uuid>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<StepResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_record: Option<ExecutionRecord>,
}

impl ExecutionResult {
    pub fn not_found(pipeline_name: &str) -> Self {
        let error = format!("Pipeline '{pipeline_name}' not found");
        Self {
            success: false,
            execution_id: None,
            summary: error.clone(),
            error: Some(error),
            results: None,
            execution_record: None,
        }
    }

    /// Build the caller-facing result from a finished record.
    pub fn from_record(record: ExecutionRecord, total_steps: usize) -> Self {
        let success = record.status == ExecutionStatus::Completed;
        let error = if success {
            None
        } else {
            record
                .results
                .as_ref()
                .and_then(|r| r.error.clone())
                .or_else(|| record.errors.last().cloned())
        };

        let mut summary = format!(
            "Pipeline: {}\nExecution ID: {}\nSteps: {}/{}\nDuration: {:.2}s\nStatus: {}",
            record.pipeline_name,
            record.execution_id,
            record.steps_executed.len(),
            total_steps,
            record.duration_secs.unwrap_or_default(),
            record.status,
        );
        if let Some(e) = &error {
            summary.push_str(&format!("\nError: {e}"));
        }

        Self {
            success,
            execution_id: Some(record.execution_id),
            summary,
            error,
            results: record.results.clone(),
            execution_record: Some(record),
        }
    }
}
