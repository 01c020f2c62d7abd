//! Core error type for agentflow.
//!
//! `FlowError` is returned by every store, handler and service in the crate.
//! Variants fall into a handful of families (see [`ErrorKind`]) so callers
//! can tell a broken agent definition apart from a flaky upstream.

/// Coarse classification of a [`FlowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad step encoding, missing handler, missing source or bridge config.
    Configuration,
    /// HTTP or database connectivity problems, non-success upstream status.
    Transport,
    /// Empty or malformed responses, unreadable files.
    Data,
    /// Redirect loops, runaway redirect chains and redirect targets that
    /// stay locked by another request.
    Cycle,
    Cancelled,
    Storage,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid step '{step}': {reason}")]
    InvalidStep { step: String, reason: String },

    #[error("Function not found: {0}")]
    HandlerNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Redirect cycle detected: {}", .0.join(" -> "))]
    RedirectCycle(Vec<String>),

    #[error("Redirect depth limit of {0} exceeded")]
    RedirectDepthExceeded(usize),

    #[error("Agent '{agent}' is busy: lock not acquired within {waited_ms} ms")]
    AgentBusy { agent: String, waited_ms: u64 },

    #[error("Pipeline cancelled before step '{0}'")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::Configuration(_)
            | FlowError::InvalidStep { .. }
            | FlowError::HandlerNotFound(_)
            | FlowError::NotFound(_) => ErrorKind::Configuration,
            FlowError::Transport(_) => ErrorKind::Transport,
            FlowError::Data(_) => ErrorKind::Data,
            FlowError::RedirectCycle(_)
            | FlowError::RedirectDepthExceeded(_)
            | FlowError::AgentBusy { .. } => ErrorKind::Cycle,
            FlowError::Cancelled(_) => ErrorKind::Cancelled,
            FlowError::Database(_) => ErrorKind::Storage,
            FlowError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid_step(step: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowError::InvalidStep {
            step: step.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for FlowError {
    fn from(e: reqwest::Error) -> Self {
        FlowError::Transport(e.to_string())
    }
}
