//! Predicate routing: condition and switch

use super::expect_data;
use crate::expr;
use seam_node::context::{ContextExt, ExecutionContext};
use seam_node::error::{FlowError, Result};
use seam_node::executor::NodeExecutor;
use seam_node::node::{NodeData, NodeKind, ValidatedNode};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Depth cap used for pre-flight compilation in `validate`; the engine
/// compiles again with the configured cap at graph-build time.
const VALIDATE_DEPTH: usize = 64;

fn expect_bool(value: Value, node: &str, source: &str) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(FlowError::Type(format!(
            "condition '{source}' on node '{node}' must produce a boolean, got {}",
            match other {
                Value::Null => "null",
                Value::Number(_) => "a number",
                Value::String(_) => "a string",
                Value::Array(_) => "a list",
                Value::Object(_) => "a mapping",
                Value::Bool(_) => unreachable!(),
            }
        ))),
    }
}

/// `condition` - evaluates one predicate and reports the selected handle.
///
/// Output is `{value, matched, path}` where `path` is `"true"` or
/// `"false"`; downstream edges with a matching `sourceHandle` receive the
/// value, the others are skipped.
pub struct ConditionExecutor;

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Condition
    }

    fn validate(&self, node: &ValidatedNode) -> Result<()> {
        if let NodeData::Condition(data) = &node.data {
            expr::compile(&data.condition, VALIDATE_DEPTH)?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Condition);
        let input = ctx.first_input_value().cloned().unwrap_or(Value::Null);
        let outcome = ctx.evaluate(&data.condition).await?;
        let matched = expect_bool(outcome, &node.id, &data.condition)?;
        Ok(json!({
            "value": input,
            "matched": matched,
            "path": if matched { "true" } else { "false" },
        }))
    }
}

/// `switch` - first matching case wins; `default_path` catches the rest.
///
/// Output is `{value, matched, output_path}`. A case may override the
/// forwarded value with its own `value`.
pub struct SwitchExecutor;

#[async_trait]
impl NodeExecutor for SwitchExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Switch
    }

    fn validate(&self, node: &ValidatedNode) -> Result<()> {
        if let NodeData::Switch(data) = &node.data {
            for case in &data.cases {
                expr::compile(&case.when, VALIDATE_DEPTH)?;
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Switch);
        let input = ctx.first_input_value().cloned().unwrap_or(Value::Null);

        for case in &data.cases {
            let outcome = ctx.evaluate(&case.when).await?;
            if expect_bool(outcome, &node.id, &case.when)? {
                let value = case.value.clone().unwrap_or_else(|| input.clone());
                return Ok(json!({
                    "value": value,
                    "matched": true,
                    "output_path": case.output_path,
                }));
            }
        }

        Ok(json!({
            "value": input,
            "matched": false,
            "output_path": data.default_path,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testctx::TestContext;
    use seam_node::node::{ConditionData, SwitchCase, SwitchData};

    fn condition_node(condition: &str) -> ValidatedNode {
        ValidatedNode {
            id: "cond".into(),
            kind: NodeKind::Condition,
            data: NodeData::Condition(ConditionData {
                condition: condition.into(),
            }),
        }
    }

    #[tokio::test]
    async fn shorthand_selects_false_path() {
        let ctx = TestContext::new().with_input(json!(42));
        let out = ConditionExecutor
            .execute(&ctx, &condition_node(">100"))
            .await
            .unwrap();
        assert_eq!(out, json!({"value": 42, "matched": false, "path": "false"}));
    }

    #[tokio::test]
    async fn full_grammar_selects_true_path() {
        let ctx = TestContext::new()
            .with_input(json!(42))
            .with_result("a", json!(10))
            .with_result("b", json!(5));
        let out = ConditionExecutor
            .execute(&ctx, &condition_node("node.a.value > node.b.value"))
            .await
            .unwrap();
        assert_eq!(out["matched"], json!(true));
        assert_eq!(out["path"], json!("true"));
    }

    #[tokio::test]
    async fn non_boolean_condition_is_a_type_error() {
        let ctx = TestContext::new().with_input(json!(1));
        let err = ConditionExecutor
            .execute(&ctx, &condition_node("1 + 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Type(_)));
    }

    #[tokio::test]
    async fn validate_rejects_bad_expressions() {
        let err = ConditionExecutor
            .validate(&condition_node("&& nope"))
            .unwrap_err();
        assert!(matches!(err, FlowError::Syntax { .. }));
    }

    fn switch_node(cases: Vec<SwitchCase>, default_path: Option<&str>) -> ValidatedNode {
        ValidatedNode {
            id: "sw".into(),
            kind: NodeKind::Switch,
            data: NodeData::Switch(SwitchData {
                cases,
                default_path: default_path.map(String::from),
            }),
        }
    }

    fn case(when: &str, output_path: &str, value: Option<Value>) -> SwitchCase {
        SwitchCase {
            when: when.into(),
            output_path: output_path.into(),
            value,
        }
    }

    #[tokio::test]
    async fn first_matching_case_wins() {
        let ctx = TestContext::new().with_input(json!(15));
        let node = switch_node(
            vec![
                case(">100", "huge", None),
                case(">10", "big", None),
                case(">0", "small", None),
            ],
            Some("other"),
        );
        let out = SwitchExecutor.execute(&ctx, &node).await.unwrap();
        assert_eq!(out["output_path"], json!("big"));
        assert_eq!(out["matched"], json!(true));
        assert_eq!(out["value"], json!(15));
    }

    #[tokio::test]
    async fn case_value_overrides_the_input() {
        let ctx = TestContext::new().with_input(json!(15));
        let node = switch_node(vec![case(">10", "big", Some(json!("plenty")))], None);
        let out = SwitchExecutor.execute(&ctx, &node).await.unwrap();
        assert_eq!(out["value"], json!("plenty"));
    }

    #[tokio::test]
    async fn unmatched_falls_to_default_path() {
        let ctx = TestContext::new().with_input(json!(-3));
        let node = switch_node(vec![case(">0", "pos", None)], Some("rest"));
        let out = SwitchExecutor.execute(&ctx, &node).await.unwrap();
        assert_eq!(out, json!({"value": -3, "matched": false, "output_path": "rest"}));
    }

    #[tokio::test]
    async fn unmatched_without_default_reports_null_path() {
        let ctx = TestContext::new().with_input(json!(-3));
        let node = switch_node(vec![case(">0", "pos", None)], None);
        let out = SwitchExecutor.execute(&ctx, &node).await.unwrap();
        assert_eq!(out["output_path"], Value::Null);
    }
}
