use super::executor::{Executor, RunOptions, RunSummary};
use super::graph::NodeGraph;
use super::runner::TaskRunnerNode;
use crate::error::{DagError, GraphError};
use crate::events::{DagEvent, DagEventKind};
use crate::observer::Observers;
use crate::snapshot::DagSnapshot;
use crate::task::Task;
use crate::types::{DagId, DagMetadata, DagState, NodeId, RunState, Status};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};

const CHANNEL_CAPACITY: usize = 256;

/// Assembles a [`Dag`]. All structural errors surface here, before anything runs.
#[derive(Debug)]
pub struct DagBuilder {
    metadata: DagMetadata,
    graph: NodeGraph,
    nodes: HashMap<NodeId, Arc<TaskRunnerNode>>,
}

impl DagBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: DagMetadata::new(name, None),
            graph: NodeGraph::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    /// Register a node. Adding the same node twice returns its id again.
    pub fn add_node(&mut self, node: impl Into<Arc<TaskRunnerNode>>) -> NodeId {
        let node = node.into();
        let id = node.id();
        if !self.graph.add_node(id) {
            tracing::debug!("Node '{}' ({}) already registered", node.name(), id);
            return id;
        }
        self.nodes.insert(id, node);
        id
    }

    /// Wrap a task in a fresh node and register it
    pub fn add_task<T>(&mut self, task: T) -> NodeId
    where
        T: Task + 'static,
    {
        self.add_node(TaskRunnerNode::new(Arc::new(task)))
    }

    /// Declare that `node` runs only after `dependency` has completed
    pub fn add_dependency(&mut self, node: NodeId, dependency: NodeId) -> Result<(), GraphError> {
        self.graph.add_dependency(node, dependency)
    }

    /// Register a node that needs every one of `required` before it runs.
    ///
    /// All inputs are validated before the graph is touched, so a rejected
    /// join leaves the builder unchanged.
    pub fn add_join(
        &mut self,
        node: impl Into<Arc<TaskRunnerNode>>,
        required: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        let node = node.into();
        let id = node.id();

        for &dependency in required {
            if dependency == id {
                return Err(GraphError::SelfDependency { node: id });
            }
            if !self.graph.contains(dependency) {
                return Err(GraphError::NodeNotFound(dependency));
            }
            if self.graph.is_ancestor(id, dependency) {
                return Err(GraphError::CycleDetected {
                    node: id,
                    dependency,
                });
            }
        }

        self.add_node(node);
        for &dependency in required {
            self.graph.add_dependency(id, dependency)?;
        }
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn build(self) -> Result<Dag, GraphError> {
        // add_dependency already refuses cycles; this re-checks the whole arena
        self.graph.topological_order()?;

        let (state, _) = watch::channel(DagState::default());
        let (updates, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);

        let shared = Arc::new(DagShared {
            metadata: self.metadata,
            graph: self.graph,
            nodes: self.nodes,
            state,
            observers: Observers::new(),
            updates,
            events,
            started: AtomicBool::new(false),
        });

        for node in shared.nodes.values() {
            let dag: Weak<DagShared> = Arc::downgrade(&shared);
            node.on_update(move |_| {
                if let Some(dag) = dag.upgrade() {
                    dag.emit();
                }
            });
        }

        tracing::debug!(
            "Built DAG '{}' with {} node(s)",
            shared.metadata.name,
            shared.graph.len()
        );

        Ok(Dag { shared })
    }
}

struct DagShared {
    metadata: DagMetadata,
    graph: NodeGraph,
    nodes: HashMap<NodeId, Arc<TaskRunnerNode>>,
    state: watch::Sender<DagState>,
    observers: Observers<DagSnapshot>,
    updates: broadcast::Sender<DagSnapshot>,
    events: broadcast::Sender<DagEvent>,
    started: AtomicBool,
}

impl DagShared {
    fn snapshot(&self) -> DagSnapshot {
        DagSnapshot {
            status: *self.state.borrow(),
            metadata: self.metadata.clone(),
            nodes: self
                .graph
                .ids()
                .filter_map(|id| self.nodes.get(&id))
                .map(|node| node.snapshot())
                .collect(),
        }
    }

    fn emit(&self) {
        let snapshot = self.snapshot();
        self.observers.emit(&snapshot);
        // lagging or absent receivers are fine, every snapshot is full state
        let _ = self.updates.send(snapshot);
    }

    fn set_state(&self, status: Status, run_state: RunState) {
        self.state.send_replace(DagState { status, run_state });
        self.emit();
    }

    fn event(&self, kind: DagEventKind) {
        let _ = self.events.send(DagEvent::new(self.metadata.id, kind));
    }

    fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.nodes.len(),
            ..RunSummary::default()
        };
        for node in self.nodes.values() {
            let state = node.task().state();
            if state.is_accepted() {
                summary.accepted += 1;
            } else if state.is_finished() {
                summary.failed += 1;
            } else {
                summary.unfinished += 1;
            }
        }
        summary
    }
}

/// A validated task graph, executed at most once.
///
/// Cloning is cheap and every clone refers to the same run.
#[derive(Clone)]
pub struct Dag {
    shared: Arc<DagShared>,
}

impl Dag {
    pub fn builder(name: impl Into<String>) -> DagBuilder {
        DagBuilder::new(name)
    }

    pub fn id(&self) -> DagId {
        self.shared.metadata.id
    }

    pub fn metadata(&self) -> &DagMetadata {
        &self.shared.metadata
    }

    pub fn state(&self) -> DagState {
        *self.shared.state.borrow()
    }

    pub fn len(&self) -> usize {
        self.shared.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<TaskRunnerNode>> {
        self.shared.nodes.get(&id)
    }

    /// Nodes without dependencies, in insertion order
    pub fn root_nodes(&self) -> Vec<Arc<TaskRunnerNode>> {
        self.collect(self.shared.graph.roots())
    }

    /// Every node, dependencies first
    pub fn nodes(&self) -> Result<Vec<Arc<TaskRunnerNode>>, GraphError> {
        Ok(self.collect(self.shared.graph.topological_order()?))
    }

    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.shared.graph.dependencies(id)
    }

    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.shared.graph.dependents(id)
    }

    fn collect(&self, ids: Vec<NodeId>) -> Vec<Arc<TaskRunnerNode>> {
        ids.into_iter()
            .filter_map(|id| self.shared.nodes.get(&id).cloned())
            .collect()
    }

    /// Call `callback` with a full snapshot after every change
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(&DagSnapshot) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(callback);
    }

    /// Channel of full snapshots, one per change
    pub fn subscribe(&self) -> broadcast::Receiver<DagSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Channel of lifecycle events
    pub fn events(&self) -> broadcast::Receiver<DagEvent> {
        self.shared.events.subscribe()
    }

    /// Full-state snapshot with nodes in insertion order
    pub fn serialize(&self) -> DagSnapshot {
        self.shared.snapshot()
    }

    pub fn emit(&self) {
        self.shared.emit();
    }

    /// Run every root concurrently and wait for all cascades to settle.
    ///
    /// Task failures are recorded in task state and logged; they are not
    /// returned. A DAG may only be started once.
    pub async fn start(&self, options: RunOptions) -> Result<RunSummary, DagError> {
        let shared = &self.shared;
        if shared.started.swap(true, Ordering::SeqCst) {
            return Err(DagError::AlreadyStarted(self.id()));
        }

        if shared.nodes.is_empty() {
            tracing::info!("DAG '{}' has no nodes; nothing to run", shared.metadata.name);
            return Ok(RunSummary::default());
        }

        let roots = self.root_nodes();
        if roots.is_empty() {
            tracing::info!(
                "DAG '{}' has no root nodes; nothing to run",
                shared.metadata.name
            );
            return Ok(shared.summary());
        }

        for node in shared.nodes.values() {
            node.arm(shared.graph.dependencies(node.id()));
        }

        tracing::info!(
            "Starting DAG '{}' ({}) with {} root(s) and {} node(s)",
            shared.metadata.name,
            shared.metadata.id,
            roots.len(),
            shared.nodes.len()
        );
        shared.set_state(Status::Started, RunState::Running);
        shared.event(DagEventKind::RunStarted {
            roots: roots.len(),
            nodes: shared.nodes.len(),
        });

        let executor = Executor {
            dag_id: shared.metadata.id,
            graph: &shared.graph,
            nodes: &shared.nodes,
            options,
            events: &shared.events,
        };
        executor.run_roots(roots).await;

        let summary = shared.summary();
        let status = if summary.is_success() {
            Status::Accepted
        } else {
            Status::Failed
        };
        shared.set_state(status, RunState::Completed);
        shared.event(DagEventKind::RunCompleted { summary });

        tracing::info!(
            "DAG '{}' finished: {} accepted, {} failed, {} unfinished",
            shared.metadata.name,
            summary.accepted,
            summary.failed,
            summary.unfinished
        );

        Ok(summary)
    }
}

impl std::fmt::Debug for Dag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dag")
            .field("metadata", &self.shared.metadata)
            .field("state", &self.state())
            .field("nodes", &self.shared.nodes.len())
            .finish()
    }
}
