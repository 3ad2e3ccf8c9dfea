// Core engine for taskdag: task graphs, execution and live snapshots

pub mod error;
pub mod events;
pub mod observer;
pub mod pipeline;
pub mod snapshot;
pub mod task;
pub mod types;

pub use error::{DagError, GraphError, TaskFailure};
pub use events::{DagEvent, DagEventKind};
pub use pipeline::{Dag, DagBuilder, RunOptions, RunSummary, TaskRunnerNode};
pub use snapshot::{DagSnapshot, NodeSnapshot, TaskSnapshot};
pub use task::{ManualHandle, ManualTask, SimpleTask, Task, TaskCore};
pub use types::*;
