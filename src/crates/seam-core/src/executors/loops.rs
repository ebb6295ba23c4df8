//! Loop nodes: for-each and while
//!
//! Neither loop executes a sub-workflow body in this engine; the body is
//! an extension point (register a custom kind wrapping an inner engine).
//! The minimal contract is to surface the list/count and to enforce both
//! the node's own iteration ceiling and the execution-wide one.

use super::expect_data;
use seam_node::context::{ContextExt, ExecutionContext};
use seam_node::error::{FlowError, Result};
use seam_node::executor::NodeExecutor;
use seam_node::node::{NodeKind, ValidatedNode};
use async_trait::async_trait;
use serde_json::{json, Value};

fn check_global_budget(ctx: &dyn ExecutionContext, count: u64) -> Result<()> {
    let total = ctx.resources().record_loop_iterations(count);
    let limit = ctx.config().max_loop_iterations;
    if total > limit {
        return Err(FlowError::QuotaExceeded {
            resource: "loop_iterations".into(),
            limit,
        });
    }
    Ok(())
}

/// `for_each` - takes one list input and reports `{items, count,
/// iterations}`. An input longer than the node's `max_iterations` fails
/// with [`FlowError::LoopLimit`]; an empty list succeeds with zero
/// iterations.
pub struct ForEachExecutor;

#[async_trait]
impl NodeExecutor for ForEachExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::ForEach
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, ForEach);
        let input = ctx.sole_input()?;
        let items = input.value.as_array().ok_or_else(|| {
            FlowError::Domain(format!(
                "for_each '{}' requires a list input",
                node.id
            ))
        })?;

        let count = items.len() as u64;
        let limit = data.limit();
        if count > limit {
            return Err(FlowError::LoopLimit {
                node: node.id.clone(),
                limit,
            });
        }
        check_global_budget(ctx, count)?;

        Ok(json!({
            "items": items,
            "count": count,
            "iterations": count,
        }))
    }
}

/// `while_loop` - re-evaluates its condition against the current value
/// until it turns false or the iteration ceiling trips.
///
/// The current value is the node's input and never changes under the
/// body-less semantics, so a constant-true condition runs exactly
/// `max_iterations` times and then fails with [`FlowError::LoopLimit`].
pub struct WhileLoopExecutor;

#[async_trait]
impl NodeExecutor for WhileLoopExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::WhileLoop
    }

    fn validate(&self, node: &ValidatedNode) -> Result<()> {
        if let seam_node::node::NodeData::WhileLoop(data) = &node.data {
            crate::expr::compile(&data.condition, 64)?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, WhileLoop);
        let input = ctx.first_input_value().cloned().unwrap_or(Value::Null);
        let limit = data.limit();

        let mut iterations: u64 = 0;
        loop {
            ctx.check_cancelled()?;
            let outcome = ctx.evaluate(&data.condition).await?;
            let keep_going = match outcome {
                Value::Bool(b) => b,
                other => {
                    return Err(FlowError::Type(format!(
                        "while_loop '{}' condition must produce a boolean, got {other}",
                        node.id
                    )))
                }
            };
            if !keep_going {
                break;
            }
            iterations += 1;
            check_global_budget(ctx, 1)?;
            if iterations >= limit {
                return Err(FlowError::LoopLimit {
                    node: node.id.clone(),
                    limit,
                });
            }
        }

        Ok(json!({
            "final_value": input,
            "iterations": iterations,
            "condition": data.condition,
        }))
    }
}
