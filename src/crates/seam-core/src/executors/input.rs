//! Source and sink nodes: literals in, visualization out

use super::expect_data;
use crate::expr::number;
use seam_node::context::{ContextExt, ExecutionContext};
use seam_node::error::Result;
use seam_node::executor::NodeExecutor;
use seam_node::node::{NodeKind, ValidatedNode};
use async_trait::async_trait;
use serde_json::{json, Value};

/// `number` - zero inputs, returns the numeric literal in `data.value`.
pub struct NumberExecutor;

#[async_trait]
impl NodeExecutor for NumberExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Number
    }

    async fn execute(&self, _ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Number);
        Ok(number(data.value))
    }
}

/// `text_input` - zero inputs, returns the string literal in `data.text`.
pub struct TextInputExecutor;

#[async_trait]
impl NodeExecutor for TextInputExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::TextInput
    }

    async fn execute(&self, _ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, TextInput);
        Ok(Value::String(data.text.clone()))
    }
}

/// `constant` - zero inputs, returns `data.value` of any shape.
pub struct ConstantExecutor;

#[async_trait]
impl NodeExecutor for ConstantExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Constant
    }

    async fn execute(&self, _ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Constant);
        Ok(data.value.clone())
    }
}

/// `visualization` - a sink that wraps its input with a display hint for
/// the front-end. No side effects.
pub struct VisualizationExecutor;

#[async_trait]
impl NodeExecutor for VisualizationExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Visualization
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Visualization);
        let input = ctx.sole_input()?;
        Ok(json!({
            "mode": data.mode.clone().unwrap_or_else(|| "raw".to_string()),
            "value": input.value,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testctx::TestContext;
    use seam_node::node::{
        ConstantData, NodeData, NumberData, TextInputData, VisualizationData,
    };

    fn node(kind: NodeKind, data: NodeData) -> ValidatedNode {
        ValidatedNode {
            id: "n".into(),
            kind,
            data,
        }
    }

    #[tokio::test]
    async fn number_returns_its_literal() {
        let ctx = TestContext::new();
        let n = node(NodeKind::Number, NodeData::Number(NumberData { value: 4.5 }));
        assert_eq!(NumberExecutor.execute(&ctx, &n).await.unwrap(), json!(4.5));

        let n = node(NodeKind::Number, NodeData::Number(NumberData { value: 10.0 }));
        assert_eq!(NumberExecutor.execute(&ctx, &n).await.unwrap(), json!(10));
    }

    #[tokio::test]
    async fn text_input_returns_its_literal() {
        let ctx = TestContext::new();
        let n = node(
            NodeKind::TextInput,
            NodeData::TextInput(TextInputData { text: "hi".into() }),
        );
        assert_eq!(TextInputExecutor.execute(&ctx, &n).await.unwrap(), json!("hi"));
    }

    #[tokio::test]
    async fn constant_returns_any_shape() {
        let ctx = TestContext::new();
        let n = node(
            NodeKind::Constant,
            NodeData::Constant(ConstantData {
                value: json!({"a": [1, 2]}),
            }),
        );
        assert_eq!(
            ConstantExecutor.execute(&ctx, &n).await.unwrap(),
            json!({"a": [1, 2]})
        );
    }

    #[tokio::test]
    async fn visualization_wraps_its_input() {
        let ctx = TestContext::new().with_input(json!([1, 2, 3]));
        let n = node(
            NodeKind::Visualization,
            NodeData::Visualization(VisualizationData {
                mode: Some("chart".into()),
            }),
        );
        assert_eq!(
            VisualizationExecutor.execute(&ctx, &n).await.unwrap(),
            json!({"mode": "chart", "value": [1, 2, 3]})
        );
    }

    #[tokio::test]
    async fn visualization_requires_an_input() {
        let ctx = TestContext::new();
        let n = node(
            NodeKind::Visualization,
            NodeData::Visualization(VisualizationData { mode: None }),
        );
        assert!(VisualizationExecutor.execute(&ctx, &n).await.is_err());
    }
}
