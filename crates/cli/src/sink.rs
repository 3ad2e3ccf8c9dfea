use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskdag_core::{Dag, DagEventKind, DagSnapshot};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Log every snapshot as JSON at debug, and progress at info whenever
/// another node finishes.
pub fn attach(dag: &Dag) {
    let finished = Arc::new(AtomicUsize::new(0));
    dag.on_update(move |snapshot| {
        match serde_json::to_string(snapshot) {
            Ok(json) => tracing::debug!("{}", json),
            Err(e) => tracing::warn!("Failed to serialize snapshot: {}", e),
        }

        let count = snapshot.finished_count();
        if finished.swap(count, Ordering::SeqCst) != count {
            tracing::info!("{}", progress_line(snapshot));
        }
    });
}

pub fn progress_line(snapshot: &DagSnapshot) -> String {
    let mut line = format!(
        "[{}/{}] {}",
        snapshot.finished_count(),
        snapshot.nodes.len(),
        snapshot.metadata.name
    );
    for node in &snapshot.nodes {
        line.push_str(&format!(" | {}: {}", node.name, node.task.state.status));
    }
    line
}

/// Log lifecycle events until the run completes
pub fn spawn_event_logger(dag: &Dag) -> JoinHandle<()> {
    let mut events = dag.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::info!("{}", describe(&event.kind));
                    if matches!(event.kind, DagEventKind::RunCompleted { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event logger fell behind, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

pub fn describe(kind: &DagEventKind) -> String {
    match kind {
        DagEventKind::RunStarted { roots, nodes } => {
            format!("Run started: {} node(s), {} root(s)", nodes, roots)
        }
        DagEventKind::NodeStarted { name, attempt, .. } => {
            format!("{} started (attempt {})", name, attempt)
        }
        DagEventKind::NodeCompleted { name, status, .. } => {
            format!("{} completed: {}", name, status)
        }
        DagEventKind::NodeFailed {
            name,
            error,
            attempt,
            will_retry,
            ..
        } => {
            let next = if *will_retry { "retrying" } else { "giving up" };
            format!("{} failed on attempt {}: {} ({})", name, attempt, error, next)
        }
        DagEventKind::RunCompleted { summary } => format!(
            "Run completed: {} accepted, {} failed, {} unfinished",
            summary.accepted, summary.failed, summary.unfinished
        ),
    }
}
