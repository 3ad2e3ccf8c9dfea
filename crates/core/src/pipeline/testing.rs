use crate::task::{Task, TaskCore};
use crate::types::{TaskInput, TaskResults};
use anyhow::{bail, Result};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared record of `start:`, `fail:` and `end:` entries in call order
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub(crate) fn position(entries: &[String], entry: &str) -> usize {
    entries
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry} not found in {entries:?}"))
}

/// A task whose behaviour is fixed up front
#[derive(Debug)]
pub(crate) struct ScriptedTask {
    core: TaskCore,
    log: CallLog,
    delay: Duration,
    failures_left: AtomicU32,
    fail_prepare: bool,
    record_failures: bool,
    runs: AtomicU32,
    inputs: Mutex<Vec<TaskInput>>,
}

impl ScriptedTask {
    pub(crate) fn new(name: &str, log: CallLog) -> Self {
        Self {
            core: TaskCore::new(name),
            log,
            delay: Duration::ZERO,
            failures_left: AtomicU32::new(0),
            fail_prepare: false,
            record_failures: false,
            runs: AtomicU32::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `count` runs
    pub(crate) fn failing_runs(self, count: u32) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    /// Mark the task failed before returning each scripted error
    pub(crate) fn recording_failures(mut self) -> Self {
        self.record_failures = true;
        self
    }

    pub(crate) fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Inputs received, one per run
    pub(crate) fn inputs(&self) -> Vec<TaskInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Task for ScriptedTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    async fn prepare(&self) -> Result<()> {
        if self.fail_prepare {
            bail!("scripted prepare failure of {}", self.core.name());
        }
        self.core.mark_prepared();
        Ok(())
    }

    async fn run(&self, input: TaskInput) -> Result<()> {
        let name = self.core.name().to_string();
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input);
        self.log.push(format!("start:{name}"));
        self.core.mark_running();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            self.log.push(format!("fail:{name}"));
            if self.record_failures {
                self.core.fail(format!("scripted failure of {name}"));
            }
            bail!("scripted failure of {name}");
        }

        self.core.accept();
        self.log.push(format!("end:{name}"));
        Ok(())
    }

    async fn results(&self) -> Result<TaskResults> {
        Ok(TaskResults::from_value(json!({ "step": self.core.name() }))
            .with_author(self.core.name()))
    }
}
