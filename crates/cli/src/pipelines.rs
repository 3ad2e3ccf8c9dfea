//! Demo pipelines modelled on the conformance flows.
//!
//! Each step is a stand-in that waits briefly and reports a fixed result;
//! the final evaluation step joins the statuses of the steps it needs.

use crate::config::DemoConfig;
use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::ValueEnum;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use taskdag_core::{
    Dag, DagBuilder, GraphError, NodeId, SimpleTask, Status, Task, TaskCore, TaskInput,
    TaskResults, TaskRunnerNode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PipelineKind {
    Holder,
    Issuer,
    Verifier,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 3] = [
        PipelineKind::Holder,
        PipelineKind::Issuer,
        PipelineKind::Verifier,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineKind::Holder => "holder",
            PipelineKind::Issuer => "issuer",
            PipelineKind::Verifier => "verifier",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PipelineKind::Holder => "Holder Conformance Test",
            PipelineKind::Issuer => "Issuer Conformance Test",
            PipelineKind::Verifier => "Verifier Conformance Test",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineKind::Holder => "Connect to a holder wallet and request a proof",
            PipelineKind::Issuer => "Connect to an issuer and receive a credential",
            PipelineKind::Verifier => "Connect to a verifier and present a credential",
        }
    }

    pub fn build(&self, demo: &DemoConfig) -> Result<Dag, GraphError> {
        let steps = Steps { demo };
        let mut builder = DagBuilder::new(self.title()).with_description(self.description());

        let connection = builder.add_node(steps.node(
            "Setup Connection",
            "Establish a DIDComm connection",
            json!({ "connection": "established" }),
        ));

        match self {
            PipelineKind::Holder => {
                let proof = builder.add_node(steps.node(
                    "Request Proof",
                    "Request a presentation from the holder",
                    json!({ "presentation": "received" }),
                ));
                builder.add_dependency(proof, connection)?;
                steps.evaluation(&mut builder, &[proof])?;
            }
            PipelineKind::Issuer => {
                let issue = builder.add_node(steps.node(
                    "Issue Credential",
                    "Receive a credential from the issuer",
                    json!({ "credential": "stored" }),
                ));
                builder.add_dependency(issue, connection)?;
                steps.evaluation(&mut builder, &[issue])?;
            }
            PipelineKind::Verifier => {
                let presentation = builder.add_node(steps.node(
                    "Present Credential",
                    "Answer the verifier's proof request",
                    json!({ "presentation": "sent" }),
                ));
                let verification = builder.add_node(steps.node(
                    "Await Verification",
                    "Wait for the verifier's verdict",
                    json!({ "verified": true }),
                ));
                builder.add_dependency(presentation, connection)?;
                builder.add_dependency(verification, presentation)?;
                steps.evaluation(&mut builder, &[verification, connection])?;
            }
        }

        builder.build()
    }
}

struct Steps<'a> {
    demo: &'a DemoConfig,
}

impl Steps<'_> {
    fn node(&self, name: &str, description: &str, value: Value) -> TaskRunnerNode {
        let delay = self.demo.step_delay();
        let task: Arc<dyn Task> = if self.demo.fail_step.as_deref() == Some(name) {
            Arc::new(FailingStep::new(name, delay).with_description(description))
        } else {
            Arc::new(
                SimpleTask::new(name, delay)
                    .with_description(description)
                    .with_value(value),
            )
        };
        TaskRunnerNode::new(task)
    }

    fn evaluation(
        &self,
        builder: &mut DagBuilder,
        required: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        let task = EvaluationTask::new("Evaluate Results")
            .with_description("Check that every required step was accepted");
        builder.add_join(TaskRunnerNode::new(Arc::new(task)), required)
    }
}

/// A step configured to fail, for exercising retries and failure reporting
#[derive(Debug)]
pub struct FailingStep {
    core: TaskCore,
    delay: Duration,
}

impl FailingStep {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            core: TaskCore::new(name),
            delay,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.core = self.core.with_description(description);
        self
    }
}

#[async_trait]
impl Task for FailingStep {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    async fn run(&self, _input: TaskInput) -> Result<()> {
        self.core.mark_running();
        tokio::time::sleep(self.delay).await;
        bail!("'{}' is configured to fail", self.core.name())
    }
}

/// Final step of a pipeline: passes only if every required step was accepted
#[derive(Debug)]
pub struct EvaluationTask {
    core: TaskCore,
    report: Mutex<Option<Value>>,
}

impl EvaluationTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: TaskCore::new(name),
            report: Mutex::new(None),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.core = self.core.with_description(description);
        self
    }
}

#[async_trait]
impl Task for EvaluationTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    async fn run(&self, input: TaskInput) -> Result<()> {
        self.core.mark_running();

        let mut steps = Map::new();
        let mut rejected = Vec::new();
        for upstream in input.iter() {
            self.core
                .add_message(format!("{}: {}", upstream.name, upstream.status));
            steps.insert(upstream.name.clone(), json!(upstream.status));
            if upstream.status != Status::Accepted {
                rejected.push(upstream.name.clone());
            }
        }

        let passed = !input.is_empty() && rejected.is_empty();
        *self.report.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(json!({ "passed": passed, "steps": steps }));

        if passed {
            self.core.accept();
        } else if input.is_empty() {
            self.core.fail("No steps to evaluate");
        } else {
            self.core
                .fail(format!("Steps not accepted: {}", rejected.join(", ")));
        }
        Ok(())
    }

    async fn results(&self) -> Result<TaskResults> {
        let report = self
            .report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(match report {
            Some(value) => TaskResults::from_value(value).with_author(self.core.name()),
            None => self.core.default_results(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdag_core::{RunOptions, RunState, Upstream};

    fn quick() -> DemoConfig {
        DemoConfig {
            step_delay_ms: 5,
            fail_step: None,
        }
    }

    fn upstream(name: &str, status: Status) -> Upstream {
        Upstream {
            node: NodeId::new(),
            name: name.to_string(),
            status,
            results: TaskResults::default(),
        }
    }

    fn names(dag: &Dag) -> Vec<String> {
        dag.nodes().unwrap().iter().map(|n| n.name()).collect()
    }

    #[test]
    fn test_pipeline_shapes() {
        let holder = PipelineKind::Holder.build(&quick()).unwrap();
        assert_eq!(
            names(&holder),
            vec!["Setup Connection", "Request Proof", "Evaluate Results"]
        );

        let verifier = PipelineKind::Verifier.build(&quick()).unwrap();
        assert_eq!(verifier.len(), 4);
        assert_eq!(verifier.root_nodes().len(), 1);
        let evaluation = verifier
            .nodes()
            .unwrap()
            .into_iter()
            .find(|n| n.name() == "Evaluate Results")
            .unwrap();
        assert_eq!(verifier.dependencies(evaluation.id()).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issuer_pipeline_passes() {
        let dag = PipelineKind::Issuer.build(&quick()).unwrap();
        let summary = dag.start(RunOptions::default()).await.unwrap();

        assert!(summary.is_success());
        let snapshot = dag.serialize();
        let evaluation = snapshot.node_named("Evaluate Results").unwrap();
        assert_eq!(evaluation.task.state.status, Status::Accepted);
        assert_eq!(
            evaluation.task.state.messages.last().map(String::as_str),
            Some("Issue Credential: Accepted")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_step_blocks_evaluation() {
        let demo = DemoConfig {
            fail_step: Some("Present Credential".to_string()),
            ..quick()
        };
        let dag = PipelineKind::Verifier.build(&demo).unwrap();
        let summary = dag
            .start(RunOptions::new().with_delay(Duration::from_millis(1)))
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.unfinished, 2);
        let snapshot = dag.serialize();
        let failed = snapshot.node_named("Present Credential").unwrap();
        assert_eq!(failed.task.state.status, Status::Failed);
        assert_eq!(
            snapshot.node_named("Evaluate Results").unwrap().state,
            RunState::NotStarted
        );
    }

    #[tokio::test]
    async fn test_evaluation_reports_rejected_steps() {
        let task = EvaluationTask::new("Evaluate");
        task.prepare().await.unwrap();
        task.run(TaskInput::new(vec![
            upstream("Setup Connection", Status::Accepted),
            upstream("Request Proof", Status::Failed),
        ]))
        .await
        .unwrap();

        let state = task.state();
        assert_eq!(state.status, Status::Failed);
        assert_eq!(state.errors, vec!["Steps not accepted: Request Proof".to_string()]);

        let results = task.results().await.unwrap();
        let report = results.value.unwrap();
        assert_eq!(report["passed"], false);
        assert_eq!(report["steps"]["Request Proof"], "Failed");
    }
}
