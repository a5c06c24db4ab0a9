//! Per-image state machine
//!
//! ```text
//! Pending -> Ready -> Building -> Tagging -> Pushing -> Succeeded
//!                        |           |          |
//!                        +-----------+----------+----> Failed
//! Pending / Ready -> Skipped
//! ```
//!
//! Every transition is appended to a timeline with a monotonically increasing
//! sequence number so ordering can be checked after the run.

use crate::error::{NodeError, StateError};
use crate::executor::BuiltImage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Ready,
    Building,
    Tagging,
    Pushing,
    Succeeded,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Skipped
        )
    }

    /// Held by a worker
    pub fn is_active(self) -> bool {
        matches!(
            self,
            NodeStatus::Building | NodeStatus::Tagging | NodeStatus::Pushing
        )
    }

    pub fn can_transition_to(self, next: NodeStatus) -> bool {
        use NodeStatus::*;

        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Ready, Building)
                | (Ready, Skipped)
                | (Building, Tagging)
                | (Building, Pushing)
                | (Building, Succeeded)
                | (Building, Failed)
                | (Tagging, Pushing)
                | (Tagging, Succeeded)
                | (Tagging, Failed)
                | (Pushing, Succeeded)
                | (Pushing, Failed)
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Ready => "ready",
            NodeStatus::Building => "building",
            NodeStatus::Tagging => "tagging",
            NodeStatus::Pushing => "pushing",
            NodeStatus::Succeeded => "succeeded",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A recorded status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub seq: u64,
    pub image: String,
    pub from: NodeStatus,
    pub to: NodeStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NodeState {
    pub status: NodeStatus,
    pub error: Option<NodeError>,
    pub image: Option<BuiltImage>,
    pub tagged: Vec<String>,
    pub pushed: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            status: NodeStatus::Pending,
            error: None,
            image: None,
            tagged: Vec::new(),
            pushed: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// State of every image in one run. Only the scheduler mutates it.
#[derive(Debug, Default)]
pub struct RunState {
    nodes: HashMap<String, NodeState>,
    timeline: Vec<Transition>,
}

impl RunState {
    pub fn new<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            nodes: names
                .into_iter()
                .map(|name| (name.to_string(), NodeState::default()))
                .collect(),
            timeline: Vec::new(),
        }
    }

    pub fn status(&self, name: &str) -> Option<NodeStatus> {
        self.nodes.get(name).map(|node| node.status)
    }

    pub fn get(&self, name: &str) -> Option<&NodeState> {
        self.nodes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut NodeState> {
        self.nodes.get_mut(name)
    }

    pub fn timeline(&self) -> &[Transition] {
        &self.timeline
    }

    /// Names of images not yet in a terminal state.
    pub fn unfinished(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| !node.status.is_terminal())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn transition(&mut self, name: &str, next: NodeStatus) -> Result<(), StateError> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownImage(name.to_string()))?;

        let from = node.status;
        if !from.can_transition_to(next) {
            return Err(StateError::IllegalTransition {
                image: name.to_string(),
                from,
                to: next,
            });
        }

        let now = Utc::now();
        node.status = next;
        if next == NodeStatus::Building {
            node.started_at = Some(now);
        }
        if next.is_terminal() {
            node.finished_at = Some(now);
        }

        self.timeline.push(Transition {
            seq: self.timeline.len() as u64,
            image: name.to_string(),
            from,
            to: next,
            at: now,
        });
        Ok(())
    }

    /// Move to a terminal failure state and record why.
    pub fn fail(&mut self, name: &str, next: NodeStatus, error: NodeError) -> Result<(), StateError> {
        self.transition(name, next)?;
        if let Some(node) = self.nodes.get_mut(name) {
            node.error = Some(error);
        }
        Ok(())
    }

    pub fn into_parts(self) -> (HashMap<String, NodeState>, Vec<Transition>) {
        (self.nodes, self.timeline)
    }
}
