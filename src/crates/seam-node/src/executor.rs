//! The node-executor plugin interface

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::node::{NodeKind, ValidatedNode};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Lifecycle state of one node within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    /// All incoming edges came from condition/switch handles that were not
    /// selected (directly or transitively).
    Skipped,
}

/// One executor per node kind.
///
/// Implementations are registered with the engine's registry at
/// construction time, exactly one per kind, and dispatched through the
/// middleware chain. Executors interact with the execution only through
/// the [`ExecutionContext`] handle.
///
/// ```rust
/// use seam_node::executor::NodeExecutor;
/// use seam_node::context::{ContextExt, ExecutionContext};
/// use seam_node::node::{NodeKind, ValidatedNode};
/// use seam_node::error::Result;
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
///
/// struct EchoExecutor;
///
/// #[async_trait]
/// impl NodeExecutor for EchoExecutor {
///     fn kind(&self) -> NodeKind {
///         NodeKind::Custom("echo".into())
///     }
///
///     async fn execute(
///         &self,
///         ctx: &dyn ExecutionContext,
///         _node: &ValidatedNode,
///     ) -> Result<Value> {
///         Ok(ctx.first_input_value().cloned().unwrap_or(Value::Null))
///     }
/// }
/// ```
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// The node kind this executor handles.
    fn kind(&self) -> NodeKind;

    /// Pre-flight structural check, invoked once per node per execution by
    /// the validation middleware. The default accepts everything the data
    /// model already validated.
    fn validate(&self, _node: &ValidatedNode) -> Result<()> {
        Ok(())
    }

    /// Execute the node and produce its result-map value.
    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value>;
}
