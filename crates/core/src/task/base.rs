use crate::observer::{Callback, Observers};
use crate::types::{RunState, Status, TaskMetadata, TaskResults, TaskState};
use serde_json::json;
use tokio::sync::watch;

/// Bookkeeping shared by every task implementation.
///
/// Holds the task's metadata and its observable [`TaskState`]. All state
/// changes go through this type so that the run state never moves
/// backwards and every change reaches the registered observers.
pub struct TaskCore {
    metadata: TaskMetadata,
    state: watch::Sender<TaskState>,
    observers: Observers<TaskState>,
}

impl TaskCore {
    pub fn new(name: impl Into<String>) -> Self {
        let (state, _) = watch::channel(TaskState::default());
        Self {
            metadata: TaskMetadata::new(name, None),
            state,
            observers: Observers::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Snapshot of the current state
    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Receiver that is notified whenever the state changes
    pub fn watch(&self) -> watch::Receiver<TaskState> {
        self.state.subscribe()
    }

    pub fn on_update(&self, callback: Callback<TaskState>) {
        self.observers.add(callback);
    }

    pub fn is_finished(&self) -> bool {
        self.state.borrow().is_finished()
    }

    /// Apply a change, then notify observers once the write has been released
    fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut TaskState),
    {
        self.state.send_modify(change);
        let snapshot = self.state();
        self.observers.emit(&snapshot);
    }

    pub fn mark_prepared(&self) {
        self.add_message(format!("Task '{}' is being prepared.", self.metadata.name));
        let name = self.metadata.name.clone();
        self.update(|state| {
            state.status = Status::Started;
            advance(&name, state, RunState::Started);
        });
    }

    pub fn mark_running(&self) {
        self.add_message(format!("Task '{}' has started running.", self.metadata.name));
        self.set_run_state(RunState::Running);
    }

    /// Move the run state forward. Regressions are ignored.
    pub fn set_run_state(&self, next: RunState) {
        let name = self.metadata.name.clone();
        self.update(|state| {
            advance(&name, state, next);
        });
    }

    pub fn set_status(&self, status: Status) {
        self.update(|state| state.status = status);
    }

    /// Finish the task with the given outcome in a single transition
    pub fn complete(&self, status: Status) {
        let name = self.metadata.name.clone();
        self.update(|state| {
            advance(&name, state, RunState::Completed);
            state.status = status;
        });
    }

    pub fn accept(&self) {
        self.complete(Status::Accepted);
    }

    /// Record the reason and finish the task as failed
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let name = self.metadata.name.clone();
        self.update(|state| {
            state.errors.push(reason);
            advance(&name, state, RunState::Completed);
            state.status = Status::Failed;
        });
    }

    pub fn add_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|state| state.messages.push(message));
    }

    pub fn add_warning(&self, warning: impl Into<String>) {
        let warning = warning.into();
        self.update(|state| state.warnings.push(warning));
    }

    pub fn add_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.update(|state| state.errors.push(error));
    }

    /// Move errors recorded after the first `keep` into warnings
    pub fn demote_errors(&self, keep: usize) {
        if self.state.borrow().errors.len() <= keep {
            return;
        }
        self.update(|state| {
            let stale = state.errors.split_off(keep);
            state
                .warnings
                .extend(stale.into_iter().map(|error| format!("Recovered: {error}")));
        });
    }

    /// Results reporting only the task's status
    pub fn default_results(&self) -> TaskResults {
        let status = self.state.borrow().status;
        TaskResults::from_value(json!({ "status": status })).with_author(self.metadata.name.clone())
    }
}

impl std::fmt::Debug for TaskCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCore")
            .field("metadata", &self.metadata)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

fn advance(name: &str, state: &mut TaskState, next: RunState) {
    if next < state.run_state {
        tracing::debug!(
            "Ignoring run state regression for task '{}': {} -> {}",
            name,
            state.run_state,
            next
        );
        return;
    }
    state.run_state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_initial_state() {
        let core = TaskCore::new("Setup Connection").with_description("Connect to the wallet");
        let state = core.state();

        assert_eq!(state.status, Status::NotStarted);
        assert_eq!(state.run_state, RunState::NotStarted);
        assert!(state.messages.is_empty());
        assert_eq!(
            core.metadata().description.as_deref(),
            Some("Connect to the wallet")
        );
    }

    #[test]
    fn test_happy_path_transitions() {
        let core = TaskCore::new("Issue Credential");

        core.mark_prepared();
        assert_eq!(core.state().run_state, RunState::Started);
        assert_eq!(core.state().status, Status::Started);

        core.mark_running();
        core.set_status(Status::Pending);
        assert_eq!(core.state().run_state, RunState::Running);

        core.accept();
        let state = core.state();
        assert!(state.is_accepted());
        assert_eq!(
            state.messages,
            vec![
                "Task 'Issue Credential' is being prepared.".to_string(),
                "Task 'Issue Credential' has started running.".to_string(),
            ]
        );
    }

    #[test]
    fn test_run_state_never_regresses() {
        let core = TaskCore::new("Evaluate");
        core.complete(Status::Accepted);
        core.mark_running();
        core.set_run_state(RunState::Started);

        assert_eq!(core.state().run_state, RunState::Completed);
    }

    #[test]
    fn test_fail_records_reason() {
        let core = TaskCore::new("Request Proof");
        core.mark_prepared();
        core.fail("presentation rejected");

        let state = core.state();
        assert_eq!(state.run_state, RunState::Completed);
        assert_eq!(state.status, Status::Failed);
        assert_eq!(state.errors, vec!["presentation rejected".to_string()]);
    }

    #[test]
    fn test_demote_errors_keeps_earlier_ones() {
        let core = TaskCore::new("Request Proof");
        core.add_error("wallet unreachable");
        core.fail("presentation rejected");
        core.accept();

        core.demote_errors(1);
        let state = core.state();
        assert!(state.is_accepted());
        assert_eq!(state.errors, vec!["wallet unreachable".to_string()]);
        assert_eq!(
            state.warnings,
            vec!["Recovered: presentation rejected".to_string()]
        );

        // nothing past the baseline, nothing to do
        core.demote_errors(1);
        assert_eq!(core.state().warnings.len(), 1);
    }

    #[test]
    fn test_observers_see_committed_state() {
        let core = Arc::new(TaskCore::new("Observed"));
        let calls = Arc::new(AtomicUsize::new(0));

        let reader = core.clone();
        let counter = calls.clone();
        core.on_update(Arc::new(move |state: &TaskState| {
            // reading back inside the callback must not deadlock
            assert_eq!(&reader.state(), state);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        core.add_message("one");
        core.accept();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_results_report_status() {
        let core = TaskCore::new("Simple");
        core.accept();

        let results = core.default_results();
        assert_eq!(results.value.unwrap()["status"], "Accepted");
        assert_eq!(results.author.as_deref(), Some("Simple"));
    }
}
