//! `engine` crate — pipeline models, dependency resolution, the execution
//! coordinator, and the `PipelineService` application context.

pub mod models;
pub mod error;
pub mod resolver;
pub mod executor;
pub mod factory;
pub mod service;

pub use models::{
    ExecutionRecord, ExecutionResult, ExecutionStatus, Pipeline, Routing, Step, StepRecord,
    StepStatus,
};
pub use error::EngineError;
pub use resolver::resolve_order;
pub use executor::{ExecutorConfig, PipelineExecutor};
pub use service::PipelineService;
