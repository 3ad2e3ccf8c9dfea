use super::{Task, TaskCore};
use crate::observer::lock_unpoisoned;
use crate::types::{Status, TaskInput, TaskResults};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// Resolution of a manual step
#[derive(Debug, Clone, PartialEq)]
pub enum ManualDecision {
    Accept(Option<Value>),
    Reject(String),
}

/// Sender side of a [`ManualTask`], held by whoever performs the action
#[derive(Debug)]
pub struct ManualHandle {
    sender: oneshot::Sender<ManualDecision>,
}

impl ManualHandle {
    /// Returns false if the task is gone
    pub fn accept(self, value: Option<Value>) -> bool {
        self.sender.send(ManualDecision::Accept(value)).is_ok()
    }

    pub fn reject(self, reason: impl Into<String>) -> bool {
        self.sender.send(ManualDecision::Reject(reason.into())).is_ok()
    }
}

/// A step that waits on an outside actor, such as a person scanning an
/// invitation or approving a presentation in their wallet.
///
/// While waiting the task reports `Status::Pending`. Dropping the
/// [`ManualHandle`] without deciding fails the run.
#[derive(Debug)]
pub struct ManualTask {
    core: TaskCore,
    prompt: String,
    decision: Mutex<Option<oneshot::Receiver<ManualDecision>>>,
    outcome: Mutex<Option<Value>>,
}

impl ManualTask {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> (Self, ManualHandle) {
        let (sender, receiver) = oneshot::channel();
        let task = Self {
            core: TaskCore::new(name),
            prompt: prompt.into(),
            decision: Mutex::new(Some(receiver)),
            outcome: Mutex::new(None),
        };
        (task, ManualHandle { sender })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.core = self.core.with_description(description);
        self
    }
}

#[async_trait::async_trait]
impl Task for ManualTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    async fn run(&self, _input: TaskInput) -> Result<()> {
        self.core.mark_running();

        let receiver = lock_unpoisoned(&self.decision).take().ok_or_else(|| {
            anyhow!(
                "manual task '{}' has already consumed its decision",
                self.core.name()
            )
        })?;

        self.core.set_status(Status::Pending);
        self.core.add_message(self.prompt.clone());

        match receiver.await {
            Ok(ManualDecision::Accept(value)) => {
                *lock_unpoisoned(&self.outcome) = value;
                self.core.add_message("Manual action accepted");
                self.core.accept();
                Ok(())
            }
            Ok(ManualDecision::Reject(reason)) => {
                self.core.fail(reason);
                Ok(())
            }
            Err(_) => Err(anyhow!(
                "manual action for '{}' was abandoned",
                self.core.name()
            )),
        }
    }

    async fn results(&self) -> Result<TaskResults> {
        let outcome = lock_unpoisoned(&self.outcome).clone();
        match outcome {
            Some(value) => Ok(TaskResults::from_value(value).with_author(self.core.name())),
            None => Ok(self.core.default_results()),
        }
    }
}
