//! Error taxonomy for graph construction and execution.

use crate::types::{DagId, NodeId};

/// Structural errors, raised while a graph is being wired and never during execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("A node cannot depend on itself: {node}")]
    SelfDependency { node: NodeId },

    #[error("Adding dependency \"{dependency}\" to \"{node}\" creates a cycle in the DAG")]
    CycleDetected { node: NodeId, dependency: NodeId },

    #[error("Cycle detected during topological sort at node {node}")]
    CyclicGraph { node: NodeId },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
}

/// Errors returned by [`crate::pipeline::Dag::start`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    #[error("DAG {0} has already been started")]
    AlreadyStarted(DagId),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Failure of a single branch. Isolated to that branch and logged by the driver.
#[derive(Debug, thiserror::Error)]
pub enum TaskFailure {
    #[error("Task '{name}' ({node}) failed to prepare: {error:#}")]
    Prepare {
        node: NodeId,
        name: String,
        error: anyhow::Error,
    },

    #[error("Task '{name}' ({node}) failed after {attempts} attempt(s): {error:#}")]
    Run {
        node: NodeId,
        name: String,
        attempts: u32,
        error: anyhow::Error,
    },
}

impl TaskFailure {
    pub fn node(&self) -> NodeId {
        match self {
            Self::Prepare { node, .. } | Self::Run { node, .. } => *node,
        }
    }
}
