//! Graph subsystem: adjacency, cycle detection, deterministic ordering
//!
//! The graph is built once per execution from the payload's explicit edge
//! list, augmented with the implicit edges the expression compiler reports,
//! and then ordered with Kahn's algorithm. Everything is backed by B-tree
//! collections so the produced order is a total function of the input - no
//! hash-map iteration order leaks into scheduling.
//!
//! Tie-breaking among simultaneously-ready nodes is ascending node-id
//! lexicographic order.
//!
//! ```rust
//! use seam_core::graph::FlowGraph;
//! use seam_node::node::Edge;
//!
//! let edges = vec![
//!     Edge { source: "a".into(), target: "c".into(), source_handle: None },
//!     Edge { source: "b".into(), target: "c".into(), source_handle: None },
//! ];
//! let graph = FlowGraph::build(
//!     ["a", "b", "c"].map(String::from),
//!     &edges,
//! ).unwrap();
//!
//! assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c"]);
//! ```

use seam_node::error::{FlowError, Result};
use seam_node::node::{Edge, NodeId};
use std::collections::{BTreeMap, BTreeSet};

/// One directed connection in the built graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub source: NodeId,
    pub target: NodeId,
    /// Output handle on the source, for explicit edges that carry one.
    pub handle: Option<String>,
    /// `true` when the edge was inferred from an expression reference
    /// rather than declared in the payload.
    pub implicit: bool,
}

/// Adjacency representation of one workflow.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: BTreeSet<NodeId>,
    /// Outgoing edges per source, in payload order (implicit edges appended).
    outgoing: BTreeMap<NodeId, Vec<GraphEdge>>,
    /// Incoming edges per target, in payload order (implicit edges appended).
    incoming: BTreeMap<NodeId, Vec<GraphEdge>>,
}

impl FlowGraph {
    /// Build the adjacency structure from a node-id set and an edge list.
    ///
    /// Fails with [`FlowError::Schema`] on a duplicate node id and with
    /// [`FlowError::UnknownNode`] when any edge endpoint is not in the
    /// node set.
    pub fn build(
        node_ids: impl IntoIterator<Item = NodeId>,
        edges: &[Edge],
    ) -> Result<Self> {
        let mut nodes = BTreeSet::new();
        for id in node_ids {
            if !nodes.insert(id.clone()) {
                return Err(FlowError::Schema(format!("duplicate node id '{id}'")));
            }
        }

        let mut graph = Self {
            nodes,
            outgoing: BTreeMap::new(),
            incoming: BTreeMap::new(),
        };
        for edge in edges {
            graph.insert_edge(GraphEdge {
                source: edge.source.clone(),
                target: edge.target.clone(),
                handle: edge.source_handle.clone(),
                implicit: false,
            })?;
        }
        Ok(graph)
    }

    /// Append an implicit edge inferred from an expression reference.
    ///
    /// A hop that duplicates an existing edge (explicit or implicit) is
    /// ignored; ordering only needs one edge per dependency.
    pub fn add_implicit_edge(&mut self, source: &str, target: &str) -> Result<()> {
        let exists = self
            .outgoing
            .get(source)
            .is_some_and(|edges| edges.iter().any(|e| e.target == target));
        if exists {
            return Ok(());
        }
        self.insert_edge(GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            handle: None,
            implicit: true,
        })
    }

    fn insert_edge(&mut self, edge: GraphEdge) -> Result<()> {
        for endpoint in [&edge.source, &edge.target] {
            if !self.nodes.contains(endpoint) {
                return Err(FlowError::UnknownNode {
                    node: endpoint.clone(),
                });
            }
        }
        self.incoming
            .entry(edge.target.clone())
            .or_default()
            .push(edge.clone());
        self.outgoing.entry(edge.source.clone()).or_default().push(edge);
        Ok(())
    }

    /// All node ids, ascending.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains(id)
    }

    /// Incoming edges of `id` in payload order, implicit edges last.
    pub fn incoming_edges(&self, id: &str) -> &[GraphEdge] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Outgoing edges of `id` in payload order, implicit edges last.
    pub fn outgoing_edges(&self, id: &str) -> &[GraphEdge] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct predecessors of `id`.
    pub fn dependencies_of(&self, id: &str) -> BTreeSet<NodeId> {
        self.incoming_edges(id)
            .iter()
            .map(|e| e.source.clone())
            .collect()
    }

    /// Direct successors of `id`.
    pub fn dependents_of(&self, id: &str) -> BTreeSet<NodeId> {
        self.outgoing_edges(id)
            .iter()
            .map(|e| e.target.clone())
            .collect()
    }

    /// Nodes with no outgoing edges, ascending. The last of these in
    /// topological order is the conventional final output.
    pub fn terminal_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|id| self.outgoing_edges(id).is_empty())
            .cloned()
            .collect()
    }

    /// Kahn's algorithm with ascending-node-id tie-breaking.
    ///
    /// Returns the complete order, or [`FlowError::Cycle`] carrying one
    /// concrete cycle path when the graph is not acyclic.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut indegree: BTreeMap<&NodeId, usize> =
            self.nodes.iter().map(|id| (id, 0)).collect();
        for edges in self.incoming.values() {
            for edge in edges {
                *indegree.get_mut(&edge.target).expect("endpoint checked at build") += 1;
            }
        }

        // BTreeSet keeps the ready frontier sorted, which is the whole
        // tie-breaking rule.
        let mut ready: BTreeSet<&NodeId> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for edge in self.outgoing_edges(id) {
                let degree = indegree
                    .get_mut(&edge.target)
                    .expect("endpoint checked at build");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(
                        self.nodes
                            .get(&edge.target)
                            .expect("endpoint checked at build"),
                    );
                }
            }
        }

        if order.len() < self.nodes.len() {
            let remaining: BTreeSet<&NodeId> = self
                .nodes
                .iter()
                .filter(|id| !order.contains(id))
                .collect();
            return Err(FlowError::Cycle {
                path: self.find_cycle(&remaining),
            });
        }
        Ok(order)
    }

    /// Extract one concrete cycle from the unsortable remainder.
    ///
    /// Every node Kahn's algorithm left behind kept a positive residual
    /// indegree, so it has at least one predecessor inside `remaining`;
    /// walking backwards through predecessors must eventually revisit a
    /// node. The revisited stretch, reversed, is a forward cycle.
    fn find_cycle(&self, remaining: &BTreeSet<&NodeId>) -> Vec<NodeId> {
        let start = *remaining.iter().next().expect("cycle set is non-empty");
        let mut path: Vec<&NodeId> = vec![start];
        let mut seen: BTreeMap<&NodeId, usize> = BTreeMap::from([(start, 0)]);

        let mut current = start;
        loop {
            let prev = self
                .incoming_edges(current)
                .iter()
                .map(|e| &e.source)
                .filter(|s| remaining.contains(s))
                .min()
                .expect("remaining nodes keep an incoming edge in the cycle set");
            if let Some(&first) = seen.get(prev) {
                let mut cycle = vec![prev.clone()];
                cycle.extend(path[first..].iter().rev().map(|id| (*id).clone()));
                return cycle;
            }
            seen.insert(prev, path.len());
            path.push(prev);
            current = prev;
        }
    }
}
