use super::graph::NodeGraph;
use super::runner::TaskRunnerNode;
use crate::error::TaskFailure;
use crate::events::{DagEvent, DagEventKind};
use crate::types::{DagId, NodeId, TaskInput};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Options for [`super::Dag::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Re-attempts after the first failed `run`; total attempts is one more
    pub max_retries: u32,
    /// Wait between attempts
    pub delay: Duration,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::from_secs(3),
        }
    }
}

/// Outcome counts of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub accepted: usize,
    pub failed: usize,
    /// Nodes that never completed, e.g. downstream of a failure
    pub unfinished: usize,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.accepted == self.total
    }
}

/// Drives one run of a DAG: retries, cascades and event emission
pub(crate) struct Executor<'a> {
    pub(crate) dag_id: DagId,
    pub(crate) graph: &'a NodeGraph,
    pub(crate) nodes: &'a HashMap<NodeId, Arc<TaskRunnerNode>>,
    pub(crate) options: RunOptions,
    pub(crate) events: &'a broadcast::Sender<DagEvent>,
}

impl<'a> Executor<'a> {
    /// Run every root branch concurrently. Branch failures are logged here
    /// and never escape to the caller.
    pub(crate) async fn run_roots(&self, roots: Vec<Arc<TaskRunnerNode>>) {
        let branches = roots.into_iter().map(|node| async move {
            let name = node.name();
            (name, self.run_branch(node, TaskInput::default()).await)
        });

        for (name, outcome) in join_all(branches).await {
            match outcome {
                Ok(()) => tracing::info!("Branch rooted at \"{}\" settled", name),
                Err(failure) => {
                    tracing::error!("Branch rooted at \"{}\" failed: {}", name, failure)
                }
            }
        }
    }

    /// Prepare and run a node, then cascade into its dependents
    fn run_branch(
        &self,
        node: Arc<TaskRunnerNode>,
        input: TaskInput,
    ) -> BoxFuture<'_, Result<(), TaskFailure>> {
        async move {
            if let Err(failure) = node.init().await {
                node.task().record_failure(&failure.to_string());
                self.emit(DagEventKind::NodeFailed {
                    node_id: node.id(),
                    name: node.name(),
                    error: failure.to_string(),
                    attempt: 0,
                    will_retry: false,
                });
                return Err(failure);
            }

            self.run_with_retry(&node, input).await?;

            if !node.finished() {
                tracing::warn!(
                    "Task \"{}\" returned without completing; dependents will not run",
                    node.name()
                );
                return Ok(());
            }

            self.emit(DagEventKind::NodeCompleted {
                node_id: node.id(),
                name: node.name(),
                status: node.task().state().status,
            });

            if node.stopped() {
                tracing::info!("Task \"{}\" was stopped; not cascading", node.name());
                return Ok(());
            }

            self.cascade(&node).await;
            Ok(())
        }
        .boxed()
    }

    async fn run_with_retry(
        &self,
        node: &TaskRunnerNode,
        input: TaskInput,
    ) -> Result<(), TaskFailure> {
        let max_attempts = self.options.max_attempts();
        let baseline = node.task().state().errors.len();
        let mut attempt = 1;

        loop {
            tracing::info!(
                "Running \"{}\" (attempt {}/{})",
                node.name(),
                attempt,
                max_attempts
            );
            self.emit(DagEventKind::NodeStarted {
                node_id: node.id(),
                name: node.name(),
                attempt,
            });

            let error = match node.run(input.clone()).await {
                Ok(()) => {
                    if attempt > 1 {
                        node.task().core().demote_errors(baseline);
                    }
                    return Ok(());
                }
                Err(error) => error,
            };

            let will_retry = attempt < max_attempts;
            self.emit(DagEventKind::NodeFailed {
                node_id: node.id(),
                name: node.name(),
                error: format!("{error:#}"),
                attempt,
                will_retry,
            });

            if !will_retry {
                node.task().record_failure(&format!("{error:#}"));
                return Err(TaskFailure::Run {
                    node: node.id(),
                    name: node.name(),
                    attempts: attempt,
                    error,
                });
            }

            tracing::warn!(
                "Error on attempt {} for \"{}\": {:#}. Retrying in {:?}",
                attempt,
                node.name(),
                error,
                self.options.delay
            );
            node.task()
                .core()
                .add_warning(format!("Attempt {attempt} failed: {error:#}"));
            tokio::time::sleep(self.options.delay).await;
            attempt += 1;
        }
    }

    /// Hand this node's results to each dependent; run those whose last
    /// outstanding dependency this was.
    async fn cascade(&self, node: &TaskRunnerNode) {
        let dependents = self.graph.dependents(node.id());
        if dependents.is_empty() {
            return;
        }

        let upstream = match node.upstream().await {
            Ok(upstream) => upstream,
            Err(error) => {
                tracing::error!(
                    "Could not collect results of \"{}\": {:#}; {} dependent(s) will not run",
                    node.name(),
                    error,
                    dependents.len()
                );
                return;
            }
        };

        let ready: Vec<(Arc<TaskRunnerNode>, TaskInput)> = dependents
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter_map(|child| {
                child
                    .deliver(upstream.clone())
                    .map(|input| (child.clone(), input))
            })
            .collect();

        let runs = ready.into_iter().map(|(child, input)| async move {
            let name = child.name();
            (name, self.run_branch(child, input).await)
        });

        for (name, outcome) in join_all(runs).await {
            match outcome {
                Ok(()) => tracing::debug!("Dependent task \"{}\" completed", name),
                Err(failure) => {
                    tracing::error!("Dependent task \"{}\" failed: {}", name, failure)
                }
            }
        }
    }

    fn emit(&self, kind: DagEventKind) {
        // no receivers is fine
        let _ = self.events.send(DagEvent::new(self.dag_id, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_defaults() {
        let options = RunOptions::default();
        assert_eq!(options.max_retries, 0);
        assert_eq!(options.max_attempts(), 1);
        assert_eq!(options.delay, Duration::from_secs(3));

        let options = RunOptions::new()
            .with_max_retries(2)
            .with_delay(Duration::from_millis(100));
        assert_eq!(options.max_attempts(), 3);
        assert_eq!(RunOptions::new().with_max_retries(u32::MAX).max_attempts(), u32::MAX);
    }

    #[test]
    fn test_summary_success() {
        let summary = RunSummary {
            total: 2,
            accepted: 2,
            ..RunSummary::default()
        };
        assert!(summary.is_success());
        assert!(!RunSummary {
            total: 2,
            accepted: 1,
            failed: 1,
            unfinished: 0
        }
        .is_success());
    }
}
