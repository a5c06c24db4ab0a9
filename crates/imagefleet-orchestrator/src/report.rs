//! Run report

use crate::error::NodeError;
use crate::state::{NodeState, NodeStatus, Transition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// Final state of one image.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    pub tagged: Vec<String>,
    pub pushed: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeReport {
    pub(crate) fn from_state(name: &str, state: NodeState) -> Self {
        Self {
            name: name.to_string(),
            status: state.status,
            error: state.error,
            image_id: state.image.map(|image| image.id),
            tagged: state.tagged,
            pushed: state.pushed,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// Name of the failed image that caused this one to be skipped.
    pub fn cause(&self) -> Option<&str> {
        self.error.as_ref().and_then(NodeError::root_cause)
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In manifest order
    pub images: Vec<NodeReport>,
    pub timeline: Vec<Transition>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    pub fn get(&self, name: &str) -> Option<&NodeReport> {
        self.images.iter().find(|image| image.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<NodeStatus> {
        self.get(name).map(|image| image.status)
    }

    pub fn statuses(&self) -> BTreeMap<String, NodeStatus> {
        self.images
            .iter()
            .map(|image| (image.name.clone(), image.status))
            .collect()
    }

    pub fn with_status(&self, status: NodeStatus) -> Vec<&NodeReport> {
        self.images
            .iter()
            .filter(|image| image.status == status)
            .collect()
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        self.images.iter().filter(|image| image.status == status).count()
    }

    /// Sequence number of the transition that moved `name` into `status`.
    pub fn reached_at(&self, name: &str, status: NodeStatus) -> Option<u64> {
        self.timeline
            .iter()
            .find(|t| t.image == name && t.to == status)
            .map(|t| t.seq)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub(crate) fn outcome_of(images: &[NodeReport], cancelled: bool) -> RunOutcome {
    if cancelled {
        RunOutcome::Cancelled
    } else if images.iter().all(|image| image.status == NodeStatus::Succeeded) {
        RunOutcome::Succeeded
    } else {
        RunOutcome::Failed
    }
}
