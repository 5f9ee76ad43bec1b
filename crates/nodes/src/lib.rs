//! `nodes` crate — step actions, the `ActionDispatcher` trait, and the
//! built-in dispatchers.
//!
//! Every dispatcher must implement [`ActionDispatcher`]. The engine crate
//! dispatches each pipeline step through this trait object.

pub mod action;
pub mod agent;
pub mod error;
pub mod llm;
pub mod mock;
pub mod traits;

pub use action::{StepAction, StepKind};
pub use agent::AgentDispatcher;
pub use error::NodeError;
pub use traits::{ActionDispatcher, ActionOutcome, DispatchContext, RunParameters};
