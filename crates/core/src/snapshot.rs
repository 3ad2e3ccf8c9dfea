//! Full-state snapshots pushed to live observers.
//!
//! Every notification carries the whole graph, never a diff, so an
//! observer that misses an update loses nothing.

use crate::types::{DagMetadata, DagState, NodeId, RunState, TaskId, TaskMetadata, TaskState};
use serde::{Deserialize, Serialize};

/// Snapshot of a whole DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagSnapshot {
    pub status: DagState,
    pub metadata: DagMetadata,
    pub nodes: Vec<NodeSnapshot>,
}

impl DagSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn node_named(&self, name: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn finished_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.finished).count()
    }
}

/// Snapshot of one task runner node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub description: String,
    pub state: RunState,
    pub finished: bool,
    pub stopped: bool,
    pub task: TaskSnapshot,
}

/// Snapshot of the task wrapped by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub metadata: TaskMetadata,
    pub state: TaskState,
}
