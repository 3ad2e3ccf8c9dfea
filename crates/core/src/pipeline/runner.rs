use crate::error::TaskFailure;
use crate::observer::{lock_unpoisoned, Observers};
use crate::snapshot::{NodeSnapshot, TaskSnapshot};
use crate::task::Task;
use crate::types::{NodeId, RunState, TaskInput, TaskState, Upstream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Binds one [`Task`] to one node of a DAG.
///
/// Task updates are relayed to the node's observers. The node also holds
/// the countdown latch that releases it once every dependency has
/// delivered its results.
pub struct TaskRunnerNode {
    id: NodeId,
    task: Arc<dyn Task>,
    name: Option<String>,
    description: Option<String>,
    stopped: AtomicBool,
    observers: Arc<Observers<NodeId>>,
    latch: Mutex<Latch>,
}

/// Countdown over a node's dependencies
#[derive(Debug, Default)]
struct Latch {
    slots: Vec<(NodeId, Option<Upstream>)>,
    pending: usize,
    released: bool,
}

impl TaskRunnerNode {
    pub fn new(task: Arc<dyn Task>) -> Self {
        let id = NodeId::new();
        let observers = Arc::new(Observers::new());

        let relay = observers.clone();
        task.on_update(Arc::new(move |_: &TaskState| relay.emit(&id)));

        Self {
            id,
            task,
            name: None,
            description: None,
            stopped: AtomicBool::new(false),
            observers,
            latch: Mutex::new(Latch::default()),
        }
    }

    /// Override the task's name in snapshots
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.task.metadata().name.clone())
    }

    pub fn description(&self) -> String {
        self.description
            .clone()
            .or_else(|| self.task.metadata().description.clone())
            .unwrap_or_default()
    }

    pub fn run_state(&self) -> RunState {
        self.task.state().run_state
    }

    /// True once the task has reached `RunState::Completed`
    pub fn finished(&self) -> bool {
        self.run_state().is_completed()
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(&NodeId) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback);
    }

    pub fn emit(&self) {
        self.observers.emit(&self.id);
    }

    /// Prepare the task
    pub async fn init(&self) -> Result<(), TaskFailure> {
        self.task
            .prepare()
            .await
            .map_err(|error| TaskFailure::Prepare {
                node: self.id,
                name: self.name(),
                error,
            })
    }

    /// One attempt at running the task. Cascading is driven by the DAG.
    pub async fn run(&self, input: TaskInput) -> anyhow::Result<()> {
        self.task.run(input).await
    }

    /// Advisory stop: the task is asked to stop and the node will not
    /// cascade into its dependents once its current run returns.
    pub async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!("Stopping task '{}'", self.name());
        self.stopped.store(true, Ordering::SeqCst);
        self.emit();
        self.task.stop().await
    }

    /// This node's results as seen by a dependent
    pub async fn upstream(&self) -> anyhow::Result<Upstream> {
        let results = self.task.results().await?;
        Ok(Upstream {
            node: self.id,
            name: self.name(),
            status: self.task.state().status,
            results,
        })
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let state = self.task.state();
        NodeSnapshot {
            id: self.id,
            name: self.name(),
            description: self.description(),
            state: state.run_state,
            finished: state.run_state.is_completed(),
            stopped: self.stopped(),
            task: TaskSnapshot {
                id: self.task.metadata().id,
                metadata: self.task.metadata().clone(),
                state,
            },
        }
    }

    /// Reset the latch to wait on the given dependencies
    pub(crate) fn arm(&self, dependencies: Vec<NodeId>) {
        let mut latch = lock_unpoisoned(&self.latch);
        latch.pending = dependencies.len();
        latch.slots = dependencies.into_iter().map(|id| (id, None)).collect();
        latch.released = false;
    }

    /// Record a completed dependency.
    ///
    /// Returns the assembled input exactly once: to the caller that
    /// delivers the last outstanding dependency.
    pub(crate) fn deliver(&self, upstream: Upstream) -> Option<TaskInput> {
        let mut latch = lock_unpoisoned(&self.latch);
        if latch.released {
            tracing::warn!(
                "Ignoring late delivery from '{}' to released node '{}'",
                upstream.name,
                self.id
            );
            return None;
        }

        let Some(slot) = latch
            .slots
            .iter_mut()
            .find(|(dependency, _)| *dependency == upstream.node)
        else {
            tracing::warn!(
                "Node '{}' is not a dependency of '{}'",
                upstream.name,
                self.id
            );
            return None;
        };
        if slot.1.is_some() {
            tracing::warn!("Duplicate delivery from '{}' ignored", upstream.name);
            return None;
        }
        slot.1 = Some(upstream);
        latch.pending = latch.pending.saturating_sub(1);

        if latch.pending > 0 {
            return None;
        }

        latch.released = true;
        let upstream = latch
            .slots
            .iter()
            .filter_map(|(_, delivered)| delivered.clone())
            .collect();
        Some(TaskInput::new(upstream))
    }

    /// Dependencies still outstanding
    pub fn pending_dependencies(&self) -> usize {
        lock_unpoisoned(&self.latch).pending
    }
}

impl std::fmt::Debug for TaskRunnerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunnerNode")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("run_state", &self.run_state())
            .field("stopped", &self.stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SimpleTask, TaskCore};
    use crate::types::{Status, TaskResults};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn upstream(node: NodeId, name: &str) -> Upstream {
        Upstream {
            node,
            name: name.to_string(),
            status: Status::Accepted,
            results: TaskResults::default(),
        }
    }

    fn simple(name: &str) -> TaskRunnerNode {
        TaskRunnerNode::new(Arc::new(SimpleTask::new(name, Duration::from_millis(1))))
    }

    struct BrokenPrepare {
        core: TaskCore,
    }

    #[async_trait::async_trait]
    impl Task for BrokenPrepare {
        fn core(&self) -> &TaskCore {
            &self.core
        }

        async fn prepare(&self) -> anyhow::Result<()> {
            anyhow::bail!("agent unreachable")
        }

        async fn run(&self, _input: TaskInput) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_latch_releases_once_after_all_parents() {
        let node = simple("join");
        let (left, right) = (NodeId::new(), NodeId::new());
        node.arm(vec![left, right]);

        assert!(node.deliver(upstream(right, "right")).is_none());
        assert_eq!(node.pending_dependencies(), 1);

        let input = node.deliver(upstream(left, "left")).unwrap();
        // declaration order, not arrival order
        let names: Vec<_> = input.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["left", "right"]);

        assert!(node.deliver(upstream(left, "left")).is_none());
    }

    #[test]
    fn test_latch_ignores_duplicates_and_strangers() {
        let node = simple("child");
        let parent = NodeId::new();
        node.arm(vec![parent, NodeId::new()]);

        assert!(node.deliver(upstream(parent, "parent")).is_none());
        assert!(node.deliver(upstream(parent, "parent")).is_none());
        assert!(node.deliver(upstream(NodeId::new(), "stranger")).is_none());
        assert_eq!(node.pending_dependencies(), 1);
    }

    #[test]
    fn test_name_override_and_fallback() {
        let node = simple("Setup Connection");
        assert_eq!(node.name(), "Setup Connection");
        assert_eq!(node.description(), "");

        let node = simple("Setup Connection")
            .with_name("Connect")
            .with_description("Establish a connection with the holder wallet");
        assert_eq!(node.name(), "Connect");
        assert_eq!(node.snapshot().name, "Connect");
        assert_eq!(
            node.snapshot().description,
            "Establish a connection with the holder wallet"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_updates_are_relayed() {
        let node = simple("relay");
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let id = node.id();
        node.on_update(move |from| {
            assert_eq!(*from, id);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        node.init().await.unwrap();
        node.run(TaskInput::default()).await.unwrap();

        assert!(node.finished());
        assert!(seen.load(Ordering::SeqCst) >= 4);
        assert!(node.snapshot().finished);
    }

    #[tokio::test]
    async fn test_init_failure_names_the_node() {
        let node = TaskRunnerNode::new(Arc::new(BrokenPrepare {
            core: TaskCore::new("Broken"),
        }));

        let failure = node.init().await.unwrap_err();
        assert_eq!(failure.node(), node.id());
        assert!(failure.to_string().contains("agent unreachable"));
    }

    #[tokio::test]
    async fn test_stop_is_advisory() {
        let node = simple("stoppable");
        node.stop().await.unwrap();
        assert!(node.stopped());
        assert!(node.snapshot().stopped);
        assert!(!node.finished());
    }
}
