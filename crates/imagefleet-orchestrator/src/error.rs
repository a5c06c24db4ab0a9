//! Orchestrator error types

use crate::state::NodeStatus;
use imagefleet_core::GraphError;
use serde::Serialize;
use thiserror::Error;

/// Errors that stop a run before any image is built.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("concurrency must be at least 1 (got {0})")]
    ConcurrencyLimitInvalid(usize),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Failure of a single executor operation (build, tag or push).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PhaseError {
    pub message: String,
}

impl PhaseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for PhaseError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for PhaseError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// One tag reference that could not be applied or pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagFailure {
    pub reference: String,
    pub message: String,
}

/// Why an image did not succeed. Recorded per image; never aborts the run.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeError {
    #[error("build failed: {message}")]
    Build { message: String },

    #[error("tag failed: {}", describe(.failures))]
    Tag { failures: Vec<TagFailure> },

    #[error("push failed: {}", describe(.failures))]
    Push { failures: Vec<TagFailure> },

    #[error("skipped because upstream image '{root}' failed")]
    UpstreamFailed { root: String },

    #[error("skipped because the run was cancelled")]
    Cancelled,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl NodeError {
    /// The failed image that caused a skip, if this is one.
    pub fn root_cause(&self) -> Option<&str> {
        match self {
            NodeError::UpstreamFailed { root } => Some(root),
            _ => None,
        }
    }
}

fn describe(failures: &[TagFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.reference, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Illegal state-machine use; indicates a scheduler bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown image: {0}")]
    UnknownImage(String),

    #[error("illegal transition for '{image}': {from} -> {to}")]
    IllegalTransition {
        image: String,
        from: NodeStatus,
        to: NodeStatus,
    },
}
