//! Built-in node executors
//!
//! One executor per kind in the closed set. Each is registered with the
//! engine's registry at construction; dispatch always goes through the
//! middleware chain, and executors touch execution state only through the
//! [`ExecutionContext`](seam_node::context::ExecutionContext) handle.

mod collect;
mod condition;
mod http;
mod input;
mod loops;
mod math;
mod resilience;
mod state_ops;
mod text;

pub use collect::{JoinExecutor, ParallelExecutor, SplitExecutor};
pub use condition::{ConditionExecutor, SwitchExecutor};
pub use http::HttpExecutor;
pub use input::{ConstantExecutor, NumberExecutor, TextInputExecutor, VisualizationExecutor};
pub use loops::{ForEachExecutor, WhileLoopExecutor};
pub use math::OperationExecutor;
pub use resilience::{DelayExecutor, RetryExecutor, TimeoutExecutor, TryCatchExecutor};
pub use state_ops::{
    AccumulatorExecutor, CacheExecutor, CounterExecutor, ExtractExecutor, TransformExecutor,
    VariableExecutor,
};
pub use text::TextOperationExecutor;

use crate::http::HttpFacade;
use crate::registry::ExecutorRegistry;
use seam_node::error::Result;
use std::sync::Arc;

/// Pull the typed data record for this executor's kind out of a node.
/// The engine validates data against the kind before dispatch, so a
/// mismatch here means a foreign node reached the wrong executor.
macro_rules! expect_data {
    ($node:expr, $variant:ident) => {
        match &$node.data {
            seam_node::node::NodeData::$variant(data) => data,
            _ => {
                return Err(seam_node::error::FlowError::executor(
                    $node.kind.as_str(),
                    format!("node '{}' carries data for another kind", $node.id),
                ))
            }
        }
    };
}
pub(crate) use expect_data;

/// Register every built-in executor.
pub fn register_builtins(registry: &mut ExecutorRegistry, http: Arc<HttpFacade>) -> Result<()> {
    registry.register(Arc::new(NumberExecutor))?;
    registry.register(Arc::new(TextInputExecutor))?;
    registry.register(Arc::new(ConstantExecutor))?;
    registry.register(Arc::new(VisualizationExecutor))?;
    registry.register(Arc::new(OperationExecutor))?;
    registry.register(Arc::new(TextOperationExecutor))?;
    registry.register(Arc::new(HttpExecutor::new(http)))?;
    registry.register(Arc::new(ConditionExecutor))?;
    registry.register(Arc::new(SwitchExecutor))?;
    registry.register(Arc::new(ForEachExecutor))?;
    registry.register(Arc::new(WhileLoopExecutor))?;
    registry.register(Arc::new(ParallelExecutor))?;
    registry.register(Arc::new(JoinExecutor))?;
    registry.register(Arc::new(SplitExecutor))?;
    registry.register(Arc::new(VariableExecutor))?;
    registry.register(Arc::new(ExtractExecutor))?;
    registry.register(Arc::new(TransformExecutor))?;
    registry.register(Arc::new(AccumulatorExecutor))?;
    registry.register(Arc::new(CounterExecutor))?;
    registry.register(Arc::new(CacheExecutor))?;
    registry.register(Arc::new(RetryExecutor))?;
    registry.register(Arc::new(TryCatchExecutor))?;
    registry.register(Arc::new(TimeoutExecutor))?;
    registry.register(Arc::new(DelayExecutor))?;
    Ok(())
}
