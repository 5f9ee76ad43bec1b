//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document not found")]
    NotFound,

    #[error("background write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
