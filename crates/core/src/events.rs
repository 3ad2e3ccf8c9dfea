use crate::pipeline::RunSummary;
use crate::types::{DagId, NodeId, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lifecycle event emitted while a DAG executes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagEvent {
    pub id: String,
    pub dag_id: DagId,
    pub timestamp: DateTime<Utc>,
    pub kind: DagEventKind,
}

impl DagEvent {
    pub fn new(dag_id: DagId, kind: DagEventKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            dag_id,
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DagEventKind {
    RunStarted {
        roots: usize,
        nodes: usize,
    },
    NodeStarted {
        node_id: NodeId,
        name: String,
        attempt: u32,
    },
    NodeCompleted {
        node_id: NodeId,
        name: String,
        status: Status,
    },
    NodeFailed {
        node_id: NodeId,
        name: String,
        error: String,
        attempt: u32,
        will_retry: bool,
    },
    RunCompleted {
        summary: RunSummary,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_is_tagged() {
        let event = DagEvent::new(
            DagId::new(),
            DagEventKind::NodeFailed {
                node_id: NodeId::new(),
                name: "Issue Credential".to_string(),
                error: "timeout".to_string(),
                attempt: 1,
                will_retry: true,
            },
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"]["type"], "node_failed");
        assert_eq!(value["kind"]["will_retry"], true);
    }
}
