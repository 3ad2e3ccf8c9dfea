//! Dependency graph and execution engine.
//!
//! A [`DagBuilder`] collects [`TaskRunnerNode`]s and their edges, rejecting
//! self-dependencies and cycles as they are declared. [`Dag::start`] then
//! runs every root concurrently and cascades each completed node into the
//! dependents that were waiting on it.

pub mod dag;
pub mod executor;
pub mod graph;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use dag::{Dag, DagBuilder};
pub use executor::{RunOptions, RunSummary};
pub use graph::NodeGraph;
pub use runner::TaskRunnerNode;
