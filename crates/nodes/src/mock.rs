//! `MockDispatcher` — a test double for `ActionDispatcher`.
//!
//! Useful in unit and integration tests where a real dispatcher (LLM calls,
//! subprocesses) is either unavailable or irrelevant.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{ActionDispatcher, ActionOutcome, DispatchContext, NodeError, StepAction};

/// Behaviour injected into `MockDispatcher` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return a successful outcome with this content.
    Succeed(String),
    /// Return a structured failure (`success: false`) with this error.
    Fail(String),
    /// Raise the given error instead of returning an outcome.
    Raise(NodeError),
    /// Raise a retryable error for the first `n` calls, then succeed.
    FlakyThenSucceed(u32),
    /// Sleep before succeeding (exercises step timeouts).
    Sleep(Duration),
    /// Panic inside the dispatch.
    Panic(String),
}

/// A mock dispatcher that records every call it receives and returns a
/// programmer-specified result per step ID.
pub struct MockDispatcher {
    /// Behaviour for steps without an override.
    pub default: MockBehaviour,
    /// Per-step behaviours, keyed by step ID.
    pub overrides: HashMap<String, MockBehaviour>,
    /// Step IDs seen by this dispatcher (in call order).
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockDispatcher {
    /// Create a mock where every step succeeds.
    pub fn succeeding() -> Self {
        Self {
            default: MockBehaviour::Succeed("ok".into()),
            overrides: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Override the behaviour for one step.
    pub fn with(mut self, step_id: impl Into<String>, behaviour: MockBehaviour) -> Self {
        self.overrides.insert(step_id.into(), behaviour);
        self
    }

    /// Total number of dispatches.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of dispatches for one step (retries included).
    pub fn calls_for(&self, step_id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|id| *id == step_id).count()
    }

    /// Step IDs in the order they were dispatched.
    pub fn dispatched(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionDispatcher for MockDispatcher {
    async fn dispatch(
        &self,
        action: &StepAction,
        ctx: &DispatchContext,
    ) -> Result<ActionOutcome, NodeError> {
        let seen_before = {
            let mut calls = self.calls.lock().unwrap();
            let seen = calls.iter().filter(|id| **id == ctx.step_id).count() as u32;
            calls.push(ctx.step_id.clone());
            seen
        };

        let behaviour = self.overrides.get(&ctx.step_id).unwrap_or(&self.default);

        match behaviour {
            MockBehaviour::Succeed(content) => {
                Ok(ActionOutcome::succeeded(format!("{} [{}]: {content}", ctx.step_id, action.name()))
                    .with_agent("mock"))
            }
            MockBehaviour::Fail(msg) => Ok(ActionOutcome::failed(msg.clone()).with_agent("mock")),
            MockBehaviour::Raise(err) => Err(err.clone()),
            MockBehaviour::FlakyThenSucceed(n) => {
                if seen_before < *n {
                    Err(NodeError::Retryable(format!("flaky attempt {}", seen_before + 1)))
                } else {
                    Ok(ActionOutcome::succeeded("recovered").with_agent("mock"))
                }
            }
            MockBehaviour::Sleep(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(ActionOutcome::succeeded("slept").with_agent("mock"))
            }
            MockBehaviour::Panic(msg) => panic!("{msg}"),
        }
    }
}
