//! # seam-core - Deterministic execution engine for visual workflows
//!
//! Seam executes a declarative workflow definition - a directed acyclic
//! graph of typed processing nodes - deterministically, producing per-node
//! results and a final output.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Engine                                                      │
//! │   parse -> infer kinds -> validate data                     │
//! │   build graph ──┬── compile expressions/templates           │
//! │                 └── union implicit edges, re-check cycles   │
//! │   topological order (deterministic, id tie-break)           │
//! │   walk:                                                     │
//! │     gather inputs -> skip? -> ceilings -> dispatch          │
//! │                  │                                          │
//! │                  ▼                                          │
//! │   middleware: validation > logging > rate > timeout > quota │
//! │                  │                                          │
//! │                  ▼                                          │
//! │   executor (registry: built-in kinds + plugins)             │
//! │     reads inputs, state manager, HTTP facade                │
//! │                                                             │
//! │   observer bus: workflow/node lifecycle + state changes     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`engine`] - the orchestrator: [`Engine`](engine::Engine),
//!   [`EngineBuilder`](engine::EngineBuilder).
//! - [`graph`] - adjacency, cycle detection, deterministic ordering.
//! - [`expr`] - the expression language (compile once, evaluate per node)
//!   and `{{ ... }}` templates.
//! - [`state`] - per-execution variables, accumulator, counter, TTL cache.
//! - [`registry`] / [`middleware`] - executor lookup and the dispatch
//!   chain.
//! - [`executors`] - the built-in node kinds.
//! - [`http`] - the guarded outbound HTTP facade.
//! - [`observer`] - event fan-out and the channel/stream adapter.
//! - [`viz`] - DOT / Mermaid / ASCII rendering.
//! - [`builder`] - fluent payload construction.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use seam_core::builder::WorkflowBuilder;
//! use seam_core::engine::Engine;
//! use seam_node::node::MathOp;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new()?;
//! let payload = WorkflowBuilder::new()
//!     .number("a", 10.0)
//!     .number("b", 5.0)
//!     .operation("sum", MathOp::Add)
//!     .edge("a", "sum")
//!     .edge("b", "sum")
//!     .build();
//!
//! let report = engine.run(payload).await;
//! assert_eq!(report.final_output, serde_json::json!(15));
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod engine;
pub mod executors;
pub mod expr;
pub mod graph;
pub mod http;
pub mod middleware;
pub mod observer;
pub mod registry;
pub mod state;
pub mod viz;

#[cfg(test)]
pub(crate) mod testctx;

pub use builder::WorkflowBuilder;
pub use engine::{Engine, EngineBuilder};
pub use graph::FlowGraph;
pub use http::{HttpFacade, HttpRequest, HttpResponse};
pub use observer::{ChannelObserver, ObserverBus};
pub use registry::ExecutorRegistry;
pub use state::StateManager;

// the model crate is re-exported so embedders need only one dependency
pub use seam_node;
