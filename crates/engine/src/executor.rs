//! Pipeline execution engine.
//!
//! `PipelineExecutor` is the central coordinator:
//! 1. Resolves the step dependency graph into an execution order.
//! 2. Iterates through steps in order, dispatching each via `ActionDispatcher`.
//! 3. Retries failed attempts up to the step's `retry_count`, with
//!    exponential back-off, and bounds each attempt by the step timeout.
//! 4. Appends one `StepRecord` per processed step to the execution record.
//! 5. Applies the step's routing: `abort` stops the run, anything else
//!    continues in resolver order.
//!
//! Nothing a dispatcher does (error, timeout, panic) escapes [`PipelineExecutor::run`]:
//! each is recorded as a failed step and routed by `on_failure`, and every run
//! ends with a finalised [`ExecutionRecord`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use nodes::{ActionDispatcher, ActionOutcome, DispatchContext, NodeError, RunParameters};

use crate::models::{
    ExecutionRecord, ExecutionStatus, Pipeline, Routing, Step, StepRecord, StepResults, StepStatus,
};
use crate::resolver::resolve_order;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Timeout applied to steps that do not set `timeout_secs`.
    pub default_step_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry_base_delay: Duration::from_millis(100),
            default_step_timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Single-attempt result
// ---------------------------------------------------------------------------

/// How one dispatch attempt ended.
#[derive(Debug)]
enum Attempt {
    Returned(ActionOutcome),
    Raised(NodeError),
    TimedOut(Duration),
    Panicked(String),
}

impl Attempt {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Returned(outcome) => !outcome.success,
            Self::Raised(err) => err.is_retryable(),
            Self::TimedOut(_) => true,
            Self::Panicked(_) => false,
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

/// Stateless coordinator that runs one pipeline execution at a time per call.
///
/// The executor holds no per-run state, so one instance can serve concurrent
/// runs; each call to [`PipelineExecutor::run`] owns its own record.
pub struct PipelineExecutor {
    dispatcher: Arc<dyn ActionDispatcher>,
    config: ExecutorConfig,
}

impl PipelineExecutor {
    pub fn new(dispatcher: Arc<dyn ActionDispatcher>, config: ExecutorConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Run the pipeline and return its finalised execution record.
    ///
    /// The record's status is `completed` unless an `abort`-routed step
    /// failed (`failed`), or the step graph does not resolve (`error`).
    #[instrument(skip(self, pipeline, parameters), fields(pipeline = %pipeline.name))]
    pub async fn run(&self, pipeline: &Pipeline, parameters: RunParameters) -> ExecutionRecord {
        let clock = Instant::now();
        let mut record = ExecutionRecord::start(pipeline, parameters);
        let mut results = StepResults::new(pipeline.steps.len());

        // ------------------------------------------------------------------
        // Resolve the execution order.
        // ------------------------------------------------------------------
        let order = match resolve_order(&pipeline.steps) {
            Ok(order) => order,
            Err(e) => {
                error!("cannot resolve steps of '{}': {}", pipeline.name, e);
                results.success = false;
                results.error = Some(e.to_string());
                record.errors.push(e.to_string());
                record.results = Some(results);
                record.finish(ExecutionStatus::Error, clock.elapsed());
                return record;
            }
        };
        info!(
            "starting execution {}: {} steps in order {:?}",
            record.execution_id,
            order.len(),
            order
        );

        let step_map: HashMap<&str, &Step> =
            pipeline.steps.iter().map(|s| (s.id.as_str(), s)).collect();

        // ------------------------------------------------------------------
        // Execute steps sequentially.
        // ------------------------------------------------------------------
        let mut status = ExecutionStatus::Completed;

        for step_id in &order {
            let Some(step) = step_map.get(step_id.as_str()).copied() else {
                continue;
            };
            record.current_step = Some(step.id.clone());
            info!("executing step '{}' ({})", step.name, step.id);

            let step_clock = Instant::now();
            let (attempt, attempts) = self.execute_with_retry(pipeline, &record, step).await;
            let duration_secs = step_clock.elapsed().as_secs_f64();

            let mut outcome = match attempt {
                Attempt::Returned(outcome) => outcome,
                Attempt::Raised(err) => ActionOutcome::failed(err.to_string()),
                Attempt::TimedOut(limit) => {
                    ActionOutcome::failed(format!("timed out after {}s", limit.as_secs_f64()))
                }
                Attempt::Panicked(msg) => {
                    error!("step '{}' dispatcher panicked: {}", step.id, msg);
                    ActionOutcome::failed(format!("dispatch panicked: {msg}"))
                }
            };
            outcome.duration_secs = duration_secs;

            let error_msg = (!outcome.success).then(|| {
                outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_owned())
            });

            record.steps_executed.push(StepRecord {
                step_id: step.id.clone(),
                step_name: step.name.clone(),
                status: if outcome.success { StepStatus::Success } else { StepStatus::Failed },
                duration_secs,
                timestamp: Utc::now(),
                attempts,
                error: error_msg.clone(),
            });
            results.step_results.insert(step.id.clone(), outcome);
            results.completed_steps.push(step.id.clone());

            // --------------------------------------------------------------
            // Routing.
            // --------------------------------------------------------------
            match error_msg {
                None => {
                    info!("step '{}' succeeded", step.id);
                    match &step.on_success {
                        Routing::Abort => {
                            info!("step '{}' ends the run early on success", step.id);
                            break;
                        }
                        Routing::Continue => {}
                        Routing::Target(target) => warn_unsupported_target(step, target),
                    }
                }
                Some(msg) => {
                    warn!("step '{}' failed: {}", step.id, msg);
                    record.errors.push(format!("Step {}: {}", step.id, msg));
                    match &step.on_failure {
                        Routing::Abort => {
                            error!("step '{}' is critical, aborting execution", step.id);
                            results.success = false;
                            results.error = Some(format!("Step '{}' failed: {}", step.name, msg));
                            status = ExecutionStatus::Failed;
                            break;
                        }
                        Routing::Continue => {}
                        Routing::Target(target) => warn_unsupported_target(step, target),
                    }
                }
            }
        }

        // ------------------------------------------------------------------
        // Finalise the record.
        // ------------------------------------------------------------------
        record.results = Some(results);
        record.finish(status, clock.elapsed());

        info!(
            "execution {} of '{}' finished: {} ({}/{} steps)",
            record.execution_id,
            pipeline.name,
            record.status,
            record.steps_executed.len(),
            pipeline.steps.len()
        );
        record
    }

    // -----------------------------------------------------------------------
    // Internal: dispatch a single step with retry logic.
    // -----------------------------------------------------------------------

    async fn execute_with_retry(
        &self,
        pipeline: &Pipeline,
        record: &ExecutionRecord,
        step: &Step,
    ) -> (Attempt, u32) {
        let mut ctx = DispatchContext {
            pipeline_id: pipeline.id,
            execution_id: record.execution_id,
            step_id: step.id.clone(),
            step_name: step.name.clone(),
            attempt: 1,
            parameters: record.parameters.clone(),
        };

        loop {
            let attempt = self.dispatch_once(step, &ctx).await;

            if !attempt.is_retryable() || ctx.attempt > step.retry_count {
                return (attempt, ctx.attempt);
            }

            let delay = self
                .config
                .retry_base_delay
                .saturating_mul(2u32.saturating_pow(ctx.attempt - 1));

            warn!(
                "step '{}' attempt {}/{} failed, retrying in {:?}: {:?}",
                step.id,
                ctx.attempt,
                step.retry_count + 1,
                delay,
                attempt
            );

            tokio::time::sleep(delay).await;
            ctx.attempt += 1;
        }
    }

    /// One bounded dispatch. The call runs on its own task so a panicking
    /// dispatcher cannot take the coordinator down with it.
    async fn dispatch_once(&self, step: &Step, ctx: &DispatchContext) -> Attempt {
        let dispatcher = Arc::clone(&self.dispatcher);
        let action = step.action.clone();
        let task_ctx = ctx.clone();
        let handle = tokio::spawn(async move { dispatcher.dispatch(&action, &task_ctx).await });
        let abort = handle.abort_handle();

        let limit = step
            .timeout_secs
            .map(Duration::from_secs)
            .or(self.config.default_step_timeout);

        let joined = match limit {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    return Attempt::TimedOut(limit);
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(outcome)) => {
                debug!("step '{}' returned success={}", step.id, outcome.success);
                Attempt::Returned(outcome)
            }
            Ok(Err(err)) => Attempt::Raised(err),
            Err(join_err) if join_err.is_panic() => {
                Attempt::Panicked(panic_message(join_err.into_panic()))
            }
            Err(join_err) => Attempt::Panicked(join_err.to_string()),
        }
    }
}

fn warn_unsupported_target(step: &Step, target: &str) {
    warn!(
        "step '{}' routes to '{}', but named-target routing is not supported; continuing in resolver order",
        step.id, target
    );
}
