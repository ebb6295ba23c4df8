//! Workflow visualization - DOT, Mermaid, and ASCII rendering
//!
//! Pure formatting over a workflow payload: node labels carry the
//! (declared or inferred) kind, and condition/switch/split edges are
//! labelled with their handle. Useful for debugging workflows and for
//! front-ends that want a quick structural diagram.
//!
//! ```rust
//! use seam_core::viz::{visualize, VizFormat, VizOptions};
//! use seam_node::node::WorkflowPayload;
//! use serde_json::json;
//!
//! let payload = WorkflowPayload::from_value(json!({
//!     "nodes": [
//!         {"id": "x", "data": {"value": 42}},
//!         {"id": "y", "type": "condition", "data": {"condition": ">100"}}
//!     ],
//!     "edges": [{"source": "x", "target": "y"}]
//! })).unwrap();
//!
//! let mermaid = visualize(&payload, &VizOptions {
//!     format: VizFormat::Mermaid,
//!     ..VizOptions::default()
//! }).unwrap();
//! assert!(mermaid.contains("x -->"));
//! ```

use seam_node::error::Result;
use seam_node::node::{infer_kind, WorkflowPayload};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VizFormat {
    /// Graphviz DOT.
    Dot,
    /// Mermaid flowchart, for markdown embedding.
    #[default]
    Mermaid,
    /// Quick console rendering.
    Ascii,
}

/// Rendering options.
#[derive(Debug, Clone, Default)]
pub struct VizOptions {
    pub format: VizFormat,
    /// Optional title (DOT graph label / Mermaid comment / ASCII header).
    pub title: Option<String>,
    /// Suppress kind annotations on node labels.
    pub hide_kinds: bool,
}

/// Render a workflow payload in the requested format.
pub fn visualize(payload: &WorkflowPayload, options: &VizOptions) -> Result<String> {
    // kinds are best-effort here: a node whose kind cannot be inferred
    // still renders, just without an annotation
    let kinds: BTreeMap<&str, String> = payload
        .nodes
        .iter()
        .filter_map(|node| {
            node.kind
                .clone()
                .or_else(|| infer_kind(&node.data))
                .map(|kind| (node.id.as_str(), kind.as_str().to_string()))
        })
        .collect();

    let label = |id: &str| -> String {
        match kinds.get(id) {
            Some(kind) if !options.hide_kinds => format!("{id} ({kind})"),
            _ => id.to_string(),
        }
    };

    let mut out = String::new();
    match options.format {
        VizFormat::Dot => {
            out.push_str("digraph workflow {\n");
            out.push_str("    rankdir=LR;\n");
            out.push_str("    node [shape=box, fontname=\"monospace\"];\n");
            if let Some(title) = &options.title {
                let _ = writeln!(out, "    label=\"{}\";", escape(title));
            }
            for node in &payload.nodes {
                let _ = writeln!(
                    out,
                    "    \"{}\" [label=\"{}\"];",
                    escape(&node.id),
                    escape(&label(&node.id))
                );
            }
            for edge in &payload.edges {
                match &edge.source_handle {
                    Some(handle) => {
                        let _ = writeln!(
                            out,
                            "    \"{}\" -> \"{}\" [label=\"{}\"];",
                            escape(&edge.source),
                            escape(&edge.target),
                            escape(handle)
                        );
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "    \"{}\" -> \"{}\";",
                            escape(&edge.source),
                            escape(&edge.target)
                        );
                    }
                }
            }
            out.push_str("}\n");
        }
        VizFormat::Mermaid => {
            if let Some(title) = &options.title {
                let _ = writeln!(out, "%% {title}");
            }
            out.push_str("graph TD\n");
            for node in &payload.nodes {
                let _ = writeln!(out, "    {}[\"{}\"]", sanitize(&node.id), label(&node.id));
            }
            for edge in &payload.edges {
                match &edge.source_handle {
                    Some(handle) => {
                        let _ = writeln!(
                            out,
                            "    {} -->|{}| {}",
                            sanitize(&edge.source),
                            handle,
                            sanitize(&edge.target)
                        );
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "    {} --> {}",
                            sanitize(&edge.source),
                            sanitize(&edge.target)
                        );
                    }
                }
            }
        }
        VizFormat::Ascii => {
            if let Some(title) = &options.title {
                let _ = writeln!(out, "{title}");
                let _ = writeln!(out, "{}", "=".repeat(title.len()));
            }
            let mut outgoing: BTreeMap<&str, Vec<String>> = BTreeMap::new();
            for edge in &payload.edges {
                let text = match &edge.source_handle {
                    Some(handle) => format!("-> {} [{}]", edge.target, handle),
                    None => format!("-> {}", edge.target),
                };
                outgoing.entry(edge.source.as_str()).or_default().push(text);
            }
            for node in &payload.nodes {
                let _ = writeln!(out, "{}", label(&node.id));
                if let Some(edges) = outgoing.get(node.id.as_str()) {
                    for edge in edges {
                        let _ = writeln!(out, "    {edge}");
                    }
                }
            }
        }
    }
    Ok(out)
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Mermaid node ids cannot carry arbitrary punctuation.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
