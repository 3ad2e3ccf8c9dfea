use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for a node in a DAG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a DAG instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DagId(pub Uuid);

impl DagId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DagId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a task. Ordered: a task only ever moves forward.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RunState {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    Started,
    Running,
    Completed,
}

impl RunState {
    pub fn is_completed(self) -> bool {
        self == RunState::Completed
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunState::NotStarted => "Not Started",
            RunState::Started => "Started",
            RunState::Running => "Running",
            RunState::Completed => "Completed",
        };
        f.write_str(label)
    }
}

/// Outcome of a task, orthogonal to its [`RunState`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    Started,
    Pending,
    Accepted,
    Failed,
}

impl Status {
    /// Accepted and Failed are the only outcomes a completed task may carry.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Accepted | Status::Failed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Status::NotStarted => "Not Started",
            Status::Started => "Started",
            Status::Pending => "Pending",
            Status::Accepted => "Accepted",
            Status::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Observable state of a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub status: Status,
    pub run_state: RunState,
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        self.run_state.is_completed()
    }

    pub fn is_accepted(&self) -> bool {
        self.is_finished() && self.status == Status::Accepted
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }
}

/// Descriptive metadata fixed when a task is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub id: TaskId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TaskMetadata {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: TaskId::new(),
            name: name.into(),
            description,
        }
    }
}

/// Descriptive metadata of a DAG
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagMetadata {
    pub id: DagId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DagMetadata {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: DagId::new(),
            name: name.into(),
            description,
        }
    }
}

/// Aggregate progress of a whole DAG
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagState {
    pub status: Status,
    pub run_state: RunState,
}

/// Output of a completed task, consumed by its dependents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl TaskResults {
    /// Results carrying a value, stamped with the current time
    pub fn from_value(value: Value) -> Self {
        Self {
            time: Some(Utc::now()),
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Results of one direct dependency, as delivered to a dependent node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub node: NodeId,
    pub name: String,
    pub status: Status,
    pub results: TaskResults,
}

/// Input handed to [`crate::task::Task::run`].
///
/// Root nodes receive an empty input. Every other node receives one
/// [`Upstream`] per direct dependency, in the order the dependencies
/// were declared, once all of them have completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    pub upstream: Vec<Upstream>,
}

impl TaskInput {
    pub fn new(upstream: Vec<Upstream>) -> Self {
        Self { upstream }
    }

    pub fn is_empty(&self) -> bool {
        self.upstream.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upstream.len()
    }

    /// Value produced by the first declared dependency (the single-parent case)
    pub fn value(&self) -> Option<&Value> {
        self.upstream.first().and_then(|u| u.results.value.as_ref())
    }

    /// Look up a dependency by node name (the join case)
    pub fn get(&self, name: &str) -> Option<&Upstream> {
        self.upstream.iter().find(|u| u.name == name)
    }

    pub fn by_node(&self, node: NodeId) -> Option<&Upstream> {
        self.upstream.iter().find(|u| u.node == node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Upstream> {
        self.upstream.iter()
    }

    /// True when every dependency finished with [`Status::Accepted`]
    pub fn all_accepted(&self) -> bool {
        self.upstream.iter().all(|u| u.status == Status::Accepted)
    }
}
