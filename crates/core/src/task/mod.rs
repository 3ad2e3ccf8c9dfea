//! The unit of work orchestrated by a DAG.
//!
//! Business collaborators implement [`Task`] and embed a [`TaskCore`] for
//! their metadata and state; the engine only ever talks to the trait.

pub mod base;
pub mod manual;
pub mod simple;

pub use base::TaskCore;
pub use manual::{ManualDecision, ManualHandle, ManualTask};
pub use simple::SimpleTask;

use crate::observer::Callback;
use crate::types::{TaskInput, TaskMetadata, TaskResults, TaskState};
use anyhow::Result;

/// A unit of orchestrated work.
///
/// `run` must leave the task in `RunState::Completed` with an `Accepted` or
/// `Failed` status. A task may sit in `Status::Pending` while it waits on an
/// external event, but `run` only returns once that event has resolved.
#[async_trait::async_trait]
pub trait Task: Send + Sync {
    /// Shared metadata and state for this task
    fn core(&self) -> &TaskCore;

    /// Setup step. Moves the task to `Started`.
    async fn prepare(&self) -> Result<()> {
        self.core().mark_prepared();
        Ok(())
    }

    /// Do the work, given the results of every direct dependency.
    ///
    /// A task may [`TaskCore::fail`] itself before returning `Err`. When a
    /// later retry succeeds, errors recorded by the failed attempts are
    /// moved to warnings so the final state carries only live errors.
    async fn run(&self, input: TaskInput) -> Result<()>;

    /// Output of the task. Only meaningful once the task has completed.
    async fn results(&self) -> Result<TaskResults> {
        Ok(self.core().default_results())
    }

    /// Advisory cancellation
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn metadata(&self) -> &TaskMetadata {
        self.core().metadata()
    }

    fn state(&self) -> TaskState {
        self.core().state()
    }

    fn on_update(&self, callback: Callback<TaskState>) {
        self.core().on_update(callback);
    }

    /// Called by the engine when this task's branch fails for good
    fn record_failure(&self, reason: &str) {
        self.core().fail(reason);
    }
}
