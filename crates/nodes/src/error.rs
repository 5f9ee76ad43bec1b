//! Dispatch-level error type.

use thiserror::Error;

/// Errors raised by an [`ActionDispatcher`](crate::ActionDispatcher) instead
/// of returning a structured outcome.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable` — the step is re-dispatched while its `retry_count` allows.
/// - `Fatal`     — the step fails immediately, whatever its `retry_count`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Transient failure (network hiccup, rate limit, 5xx).
    #[error("retryable dispatch error: {0}")]
    Retryable(String),

    /// Permanent failure; retrying would not help.
    #[error("fatal dispatch error: {0}")]
    Fatal(String),
}

impl NodeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// The bare message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Fatal(msg) => msg,
        }
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(err: reqwest::Error) -> Self {
        // The URL never reaches the message; it can carry credentials.
        let err = err.without_url();
        if err.is_decode() || err.is_builder() {
            Self::Fatal(err.to_string())
        } else {
            Self::Retryable(err.to_string())
        }
    }
}
