use crate::error::GraphError;
use crate::types::NodeId;
use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

/// Dependency arena for a DAG.
///
/// Nodes are keyed by [`NodeId`]; an edge `dependency -> dependent` is
/// stored once, so the dependency and dependent views can never disagree.
#[derive(Debug, Default, Clone)]
pub struct NodeGraph {
    graph: DiGraph<NodeId, ()>,
    indices: HashMap<NodeId, NodeIndex>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Returns false if it was already present.
    pub fn add_node(&mut self, id: NodeId) -> bool {
        if self.indices.contains_key(&id) {
            return false;
        }
        let index = self.graph.add_node(id);
        self.indices.insert(id, index);
        true
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.indices.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All node ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices().map(|index| self.graph[index])
    }

    fn index(&self, id: NodeId) -> Result<NodeIndex, GraphError> {
        self.indices
            .get(&id)
            .copied()
            .ok_or(GraphError::NodeNotFound(id))
    }

    /// Declare that `node` depends on `dependency`.
    ///
    /// Fails without touching the graph if the edge would point a node at
    /// itself or close a cycle. Re-adding an existing edge is a no-op.
    pub fn add_dependency(&mut self, node: NodeId, dependency: NodeId) -> Result<(), GraphError> {
        if node == dependency {
            return Err(GraphError::SelfDependency { node });
        }
        let node_index = self.index(node)?;
        let dependency_index = self.index(dependency)?;

        if self.graph.contains_edge(dependency_index, node_index) {
            return Ok(());
        }

        // dependency -> node closes a cycle iff node already reaches dependency
        if has_path_connecting(&self.graph, node_index, dependency_index, None) {
            return Err(GraphError::CycleDetected { node, dependency });
        }

        self.graph.add_edge(dependency_index, node_index, ());
        Ok(())
    }

    /// Direct dependencies of a node, in the order they were declared
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Nodes that directly depend on `id`, in the order they were declared
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        let Some(&index) = self.indices.get(&id) else {
            return Vec::new();
        };

        let mut edges: Vec<_> = self
            .graph
            .edges_directed(index, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Incoming => edge.source(),
                    Direction::Outgoing => edge.target(),
                };
                (edge.id(), self.graph[other])
            })
            .collect();
        edges.sort_by_key(|(edge, _)| edge.index());
        edges.into_iter().map(|(_, id)| id).collect()
    }

    /// True if `descendant` transitively depends on `ancestor`
    pub fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        match (self.indices.get(&ancestor), self.indices.get(&descendant)) {
            (Some(&from), Some(&to)) if from != to => {
                has_path_connecting(&self.graph, from, to, None)
            }
            _ => false,
        }
    }

    /// Nodes without dependencies, in insertion order
    pub fn roots(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|&index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|index| self.graph[index])
            .collect()
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Dependency-first ordering.
    ///
    /// Depth-first over nodes in insertion order, visiting each node's
    /// dependencies in declaration order before the node itself. The result
    /// is deterministic for a given construction sequence.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut marks: HashMap<NodeIndex, Mark> = HashMap::with_capacity(self.len());
        let mut order = Vec::with_capacity(self.len());

        for index in self.graph.node_indices() {
            self.visit(index, &mut marks, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        index: NodeIndex,
        marks: &mut HashMap<NodeIndex, Mark>,
        order: &mut Vec<NodeId>,
    ) -> Result<(), GraphError> {
        match marks.get(&index) {
            Some(Mark::Visited) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(GraphError::CyclicGraph {
                    node: self.graph[index],
                })
            }
            None => {}
        }

        marks.insert(index, Mark::Visiting);
        for dependency in self.dependencies(self.graph[index]) {
            let dependency_index = self.index(dependency)?;
            self.visit(dependency_index, marks, order)?;
        }
        marks.insert(index, Mark::Visited);
        order.push(self.graph[index]);

        Ok(())
    }
}
