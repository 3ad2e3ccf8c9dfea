use super::{Task, TaskCore};
use crate::types::{TaskInput, TaskResults};
use anyhow::Result;
use serde_json::Value;
use std::time::Duration;

/// Waits for a fixed delay, then accepts.
///
/// Useful as a stand-in for real work and as a building block in tests.
#[derive(Debug)]
pub struct SimpleTask {
    core: TaskCore,
    delay: Duration,
    value: Option<Value>,
}

impl SimpleTask {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            core: TaskCore::new(name),
            delay,
            value: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.core = self.core.with_description(description);
        self
    }

    /// Value reported by `results()` instead of the bare status
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

#[async_trait::async_trait]
impl Task for SimpleTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    async fn run(&self, _input: TaskInput) -> Result<()> {
        self.core.mark_running();
        self.core
            .add_message(format!("waiting for {} ms", self.delay.as_millis()));
        tokio::time::sleep(self.delay).await;
        self.core.accept();
        self.core
            .add_message(format!("done waiting for {} ms", self.delay.as_millis()));
        Ok(())
    }

    async fn results(&self) -> Result<TaskResults> {
        match &self.value {
            Some(value) => {
                Ok(TaskResults::from_value(value.clone()).with_author(self.core.name()))
            }
            None => Ok(self.core.default_results()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunState, Status};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_simple_task_lifecycle() {
        let task = SimpleTask::new("Wait", Duration::from_secs(1)).with_value(json!({"ok": true}));

        task.prepare().await.unwrap();
        assert_eq!(task.state().run_state, RunState::Started);

        task.run(TaskInput::default()).await.unwrap();
        let state = task.state();
        assert_eq!(state.run_state, RunState::Completed);
        assert_eq!(state.status, Status::Accepted);
        assert_eq!(state.messages.last().unwrap(), "done waiting for 1000 ms");

        let results = task.results().await.unwrap();
        assert_eq!(results.value, Some(json!({"ok": true})));
        assert_eq!(results.author.as_deref(), Some("Wait"));
    }
}
