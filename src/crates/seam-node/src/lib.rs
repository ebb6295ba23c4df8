//! # seam-node - Workflow data model and executor plugin interface
//!
//! This crate is the stable surface shared by the seam engine and node
//! executors, built-in or third-party:
//!
//! - **Payload model** ([`node`]) - nodes, edges, per-kind typed data
//!   records, and kind inference for untyped nodes.
//! - **Error taxonomy** ([`error`]) - the closed [`FlowError`] set every
//!   failure maps into.
//! - **Configuration** ([`config`]) - the immutable per-engine record of
//!   resource ceilings and tuning knobs.
//! - **Events** ([`event`]) - lifecycle event records and the [`Observer`]
//!   handler interface.
//! - **Report** ([`report`]) - the outbound execution result.
//! - **Plugin seam** ([`context`], [`executor`]) - the [`ExecutionContext`]
//!   handle the engine implements and the [`NodeExecutor`] trait executors
//!   implement.
//!
//! The engine crate (`seam-core`) depends on this crate; plugin crates
//! depend only on this crate and never on the engine, which keeps the
//! executor/engine/context dependency triangle acyclic.

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod executor;
pub mod node;
pub mod report;

pub use config::EngineConfig;
pub use context::{ContextExt, ExecutionContext, NodeInput, ResourceCounters};
pub use error::{ErrorKind, FlowError, Result};
pub use event::{Event, EventKind, EventPayload, Observer};
pub use executor::{NodeExecutor, NodeState};
pub use node::{
    Edge, Node, NodeData, NodeId, NodeKind, ValidatedNode, WorkflowPayload,
};
pub use report::{ExecutionReport, ReportError};
