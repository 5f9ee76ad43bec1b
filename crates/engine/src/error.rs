//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the pipeline engine (validation + persistence).
///
/// Step failures are never reported through this type; the coordinator
/// records them in the execution record instead.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Two or more steps share the same ID.
    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    /// A step depends on itself, directly or transitively.
    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency {
        /// The cycle as a path, first and last element equal.
        cycle: Vec<String>,
    },

    /// The pipeline definition is unusable for another reason.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    // ------ Lookup errors ------

    #[error("pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error("execution '{0}' not found")]
    ExecutionNotFound(String),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
