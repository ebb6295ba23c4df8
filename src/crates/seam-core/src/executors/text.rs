//! String operations

use super::expect_data;
use crate::expr::type_name;
use seam_node::context::{ContextExt, ExecutionContext};
use seam_node::error::{FlowError, Result};
use seam_node::executor::NodeExecutor;
use seam_node::node::{NodeKind, TextOp, ValidatedNode};
use async_trait::async_trait;
use serde_json::Value;

/// `text_operation` - transforms one string input, or concatenates all of
/// them in edge order for `concat`.
pub struct TextOperationExecutor;

#[async_trait]
impl NodeExecutor for TextOperationExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::TextOperation
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, TextOperation);
        let inputs = ctx.input_values();
        if inputs.is_empty() {
            return Err(FlowError::Domain(format!(
                "text_operation '{}' requires at least one input",
                node.id
            )));
        }
        let mut strings = Vec::with_capacity(inputs.len());
        for value in &inputs {
            match value.as_str() {
                Some(s) => strings.push(s),
                None => {
                    return Err(FlowError::Domain(format!(
                        "text_operation '{}' requires string inputs, got {}",
                        node.id,
                        type_name(value)
                    )))
                }
            }
        }

        if data.op == TextOp::Concat {
            return Ok(Value::String(strings.concat()));
        }

        // the remaining operations act on a single string
        let [input] = strings.as_slice() else {
            return Err(FlowError::Domain(format!(
                "text_operation '{}' with op '{:?}' takes exactly one input, got {}",
                node.id,
                data.op,
                strings.len()
            )));
        };

        let output = match data.op {
            TextOp::Uppercase => input.to_uppercase(),
            TextOp::Lowercase => input.to_lowercase(),
            TextOp::Titlecase => titlecase(input),
            TextOp::Camelcase => camelcase(input),
            TextOp::Inversecase => inversecase(input),
            TextOp::Trim => input.trim().to_string(),
            TextOp::Repeat => {
                let count = data.count.expect("validated at parse time") as usize;
                input.repeat(count)
            }
            TextOp::Concat => unreachable!("handled above"),
        };
        Ok(Value::String(output))
    }
}

fn titlecase(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for c in input.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

fn camelcase(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, word) in input
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let mut chars = word.chars();
        if i == 0 {
            out.extend(chars.flat_map(|c| c.to_lowercase()));
        } else if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(|c| c.to_lowercase()));
        }
    }
    out
}

fn inversecase(input: &str) -> String {
    input
        .chars()
        .flat_map(|c| {
            if c.is_uppercase() {
                c.to_lowercase().collect::<Vec<_>>()
            } else {
                c.to_uppercase().collect::<Vec<_>>()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testctx::TestContext;
    use seam_node::node::{NodeData, TextOperationData};
    use serde_json::json;

    fn text_node(op: TextOp, count: Option<u64>) -> ValidatedNode {
        ValidatedNode {
            id: "t".into(),
            kind: NodeKind::TextOperation,
            data: NodeData::TextOperation(TextOperationData { op, count }),
        }
    }

    async fn run(op: TextOp, input: &str) -> Value {
        let ctx = TestContext::new().with_input(json!(input));
        TextOperationExecutor
            .execute(&ctx, &text_node(op, None))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn case_operations() {
        assert_eq!(run(TextOp::Uppercase, "seam flow").await, json!("SEAM FLOW"));
        assert_eq!(run(TextOp::Lowercase, "SEAM").await, json!("seam"));
        assert_eq!(run(TextOp::Titlecase, "hello workflow world").await, json!("Hello Workflow World"));
        assert_eq!(run(TextOp::Camelcase, "hello workflow_world").await, json!("helloWorkflowWorld"));
        assert_eq!(run(TextOp::Inversecase, "aBc").await, json!("AbC"));
        assert_eq!(run(TextOp::Trim, "  x  ").await, json!("x"));
    }

    #[tokio::test]
    async fn concat_joins_all_inputs_in_order() {
        let ctx = TestContext::new()
            .with_input(json!("a"))
            .with_input(json!("b"))
            .with_input(json!("c"));
        assert_eq!(
            TextOperationExecutor
                .execute(&ctx, &text_node(TextOp::Concat, None))
                .await
                .unwrap(),
            json!("abc")
        );
    }

    #[tokio::test]
    async fn repeat_uses_its_count() {
        let ctx = TestContext::new().with_input(json!("ab"));
        assert_eq!(
            TextOperationExecutor
                .execute(&ctx, &text_node(TextOp::Repeat, Some(3)))
                .await
                .unwrap(),
            json!("ababab")
        );
    }

    #[tokio::test]
    async fn non_string_input_is_rejected() {
        let ctx = TestContext::new().with_input(json!(5));
        assert!(matches!(
            TextOperationExecutor
                .execute(&ctx, &text_node(TextOp::Uppercase, None))
                .await
                .unwrap_err(),
            FlowError::Domain(_)
        ));
    }

    #[tokio::test]
    async fn single_string_ops_reject_multiple_inputs() {
        let ctx = TestContext::new().with_input(json!("a")).with_input(json!("b"));
        assert!(matches!(
            TextOperationExecutor
                .execute(&ctx, &text_node(TextOp::Uppercase, None))
                .await
                .unwrap_err(),
            FlowError::Domain(_)
        ));
    }
}
