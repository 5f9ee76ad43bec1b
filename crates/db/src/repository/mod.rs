//! Repository modules — one per document collection.

pub mod executions;
pub mod pipelines;
