//! Arithmetic over ordered numeric inputs

use super::expect_data;
use crate::expr::{as_number, number, type_name};
use seam_node::context::{ContextExt, ExecutionContext};
use seam_node::error::{FlowError, Result};
use seam_node::executor::NodeExecutor;
use seam_node::node::{MathOp, NodeKind, ValidatedNode};
use async_trait::async_trait;
use serde_json::Value;

/// `operation` - folds two or more numeric inputs left to right.
pub struct OperationExecutor;

#[async_trait]
impl NodeExecutor for OperationExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Operation
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Operation);
        let inputs = ctx.input_values();
        if inputs.len() < 2 {
            return Err(FlowError::Domain(format!(
                "operation '{}' requires at least 2 inputs, got {}",
                node.id,
                inputs.len()
            )));
        }

        let mut operands = Vec::with_capacity(inputs.len());
        for value in &inputs {
            match as_number(value) {
                Some(n) => operands.push(n),
                None => {
                    return Err(FlowError::Domain(format!(
                        "operation '{}' requires numeric inputs, got {}",
                        node.id,
                        type_name(value)
                    )))
                }
            }
        }

        let mut acc = operands[0];
        for &operand in &operands[1..] {
            acc = match data.op {
                MathOp::Add => acc + operand,
                MathOp::Multiply => acc * operand,
                MathOp::Subtract => acc - operand,
                MathOp::Divide => {
                    if operand == 0.0 {
                        return Err(FlowError::Domain("division by zero".into()));
                    }
                    acc / operand
                }
            };
        }
        Ok(number(acc))
    }
}
