//! Fan-in nodes: parallel, join, split

use super::expect_data;
use seam_node::context::{ContextExt, ExecutionContext};
use seam_node::error::{FlowError, Result};
use seam_node::executor::NodeExecutor;
use seam_node::node::{JoinStrategy, NodeKind, ValidatedNode};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// `parallel` - collects already-computed inputs in edge order and
/// annotates them with the declared concurrency budget. The budget itself
/// is observed by the engine when it schedules the subgraph feeding this
/// collector.
pub struct ParallelExecutor;

#[async_trait]
impl NodeExecutor for ParallelExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Parallel
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Parallel);
        let inputs = ctx.inputs();
        if inputs.is_empty() {
            return Err(FlowError::Domain(format!(
                "parallel '{}' requires at least one input",
                node.id
            )));
        }
        let results: Vec<Value> = inputs.iter().map(|i| i.value.clone()).collect();
        let concurrency = data.max_concurrency.unwrap_or(inputs.len());
        Ok(json!({
            "results": results,
            "concurrency": concurrency,
        }))
    }
}

/// `join` - combines inputs according to the declared strategy.
///
/// - `all` returns every value, in input order.
/// - `any` returns the first non-null value among inputs whose producer
///   succeeded; failed predecessors are tolerated.
/// - `first` returns the first non-null value, but the first input's
///   producer must have succeeded.
pub struct JoinExecutor;

#[async_trait]
impl NodeExecutor for JoinExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Join
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Join);
        let inputs = ctx.inputs();
        if inputs.is_empty() {
            return Err(FlowError::Domain(format!(
                "join '{}' requires at least one input",
                node.id
            )));
        }

        match data.join_strategy {
            JoinStrategy::All => {
                for input in inputs {
                    if let Some(err) = ctx.upstream_error(&input.source) {
                        return Err(err);
                    }
                }
                Ok(Value::Array(inputs.iter().map(|i| i.value.clone()).collect()))
            }
            JoinStrategy::First => {
                let first = &inputs[0];
                if let Some(err) = ctx.upstream_error(&first.source) {
                    return Err(err);
                }
                Ok(first_non_null(ctx, inputs))
            }
            JoinStrategy::Any => {
                let any_ok = inputs
                    .iter()
                    .any(|i| ctx.upstream_error(&i.source).is_none());
                if !any_ok {
                    return Err(FlowError::Domain(format!(
                        "join '{}': every input failed",
                        node.id
                    )));
                }
                Ok(first_non_null(ctx, inputs))
            }
        }
    }
}

fn first_non_null(ctx: &dyn ExecutionContext, inputs: &[seam_node::context::NodeInput]) -> Value {
    inputs
        .iter()
        .filter(|i| ctx.upstream_error(&i.source).is_none())
        .map(|i| i.value.clone())
        .find(|v| !v.is_null())
        .unwrap_or(Value::Null)
}

/// `split` - fans one input out to every named path; downstream edges
/// select a copy by handle.
pub struct SplitExecutor;

#[async_trait]
impl NodeExecutor for SplitExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Split
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Split);
        let input = ctx.sole_input()?;
        let paths = data.paths();
        let mut outputs = Map::new();
        for path in &paths {
            outputs.insert(path.clone(), input.value.clone());
        }
        Ok(json!({
            "paths": paths,
            "outputs": outputs,
        }))
    }
}
