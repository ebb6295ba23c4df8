//! Fluent workflow construction
//!
//! Embedders and tests build payloads programmatically instead of
//! hand-writing JSON:
//!
//! ```rust
//! use seam_core::builder::WorkflowBuilder;
//! use seam_node::node::MathOp;
//!
//! let payload = WorkflowBuilder::new()
//!     .number("a", 10.0)
//!     .number("b", 5.0)
//!     .operation("sum", MathOp::Add)
//!     .edge("a", "sum")
//!     .edge("b", "sum")
//!     .build();
//! assert_eq!(payload.nodes.len(), 3);
//! ```

use seam_node::node::{Edge, MathOp, Node, NodeKind, WorkflowPayload};
use serde_json::{json, Value};

/// Accumulates nodes and edges into a [`WorkflowPayload`].
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node of any kind with a raw data record.
    pub fn node(mut self, id: &str, kind: NodeKind, data: Value) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: Some(kind),
            data,
        });
        self
    }

    pub fn number(self, id: &str, value: f64) -> Self {
        self.node(id, NodeKind::Number, json!({ "value": value }))
    }

    pub fn text(self, id: &str, text: &str) -> Self {
        self.node(id, NodeKind::TextInput, json!({ "text": text }))
    }

    pub fn constant(self, id: &str, value: Value) -> Self {
        self.node(id, NodeKind::Constant, json!({ "value": value }))
    }

    pub fn operation(self, id: &str, op: MathOp) -> Self {
        self.node(id, NodeKind::Operation, json!({ "op": op }))
    }

    pub fn condition(self, id: &str, condition: &str) -> Self {
        self.node(id, NodeKind::Condition, json!({ "condition": condition }))
    }

    pub fn http(self, id: &str, url: &str) -> Self {
        self.node(id, NodeKind::Http, json!({ "url": url }))
    }

    pub fn visualization(self, id: &str, mode: &str) -> Self {
        self.node(id, NodeKind::Visualization, json!({ "mode": mode }))
    }

    /// Add a plain edge.
    pub fn edge(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge {
            source: source.to_string(),
            target: target.to_string(),
            source_handle: None,
        });
        self
    }

    /// Add an edge leaving through a named handle.
    pub fn edge_from_handle(mut self, source: &str, handle: &str, target: &str) -> Self {
        self.edges.push(Edge {
            source: source.to_string(),
            target: target.to_string(),
            source_handle: Some(handle.to_string()),
        });
        self
    }

    pub fn build(self) -> WorkflowPayload {
        WorkflowPayload {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_payload_that_round_trips_through_json() {
        let payload = WorkflowBuilder::new()
            .number("a", 1.0)
            .condition("c", ">0")
            .edge("a", "c")
            .edge_from_handle("c", "true", "a")
            .build();

        let text = serde_json::to_string(&payload).unwrap();
        let parsed = WorkflowPayload::parse(&text).unwrap();
        assert_eq!(parsed.nodes.len(), 2);
        assert_eq!(parsed.edges[1].source_handle.as_deref(), Some("true"));
    }

    #[test]
    fn builder_nodes_carry_their_kinds() {
        let payload = WorkflowBuilder::new()
            .operation("op", MathOp::Divide)
            .build();
        assert_eq!(payload.nodes[0].kind, Some(NodeKind::Operation));
        assert_eq!(payload.nodes[0].data, json!({"op": "divide"}));
    }
}
