//! State-touching nodes: variable, extract, transform, accumulator,
//! counter, cache
//!
//! All mutation flows through the execution context into the state
//! manager, which serialises each store behind its own lock.

use super::expect_data;
use crate::expr::{as_number, number, stringify, type_name};
use seam_node::context::{ContextExt, ExecutionContext};
use seam_node::error::{FlowError, Result};
use seam_node::executor::NodeExecutor;
use seam_node::node::{
    AccumOp, CacheOp, CounterOp, NodeKind, TransformOp, ValidatedNode, VarOp,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// `variable` - get/set/delete a named per-execution variable.
pub struct VariableExecutor;

#[async_trait]
impl NodeExecutor for VariableExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Variable
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Variable);
        match data.var_op {
            VarOp::Get => Ok(ctx.get_variable(&data.var_name).await.unwrap_or(Value::Null)),
            VarOp::Set => {
                let input = ctx.sole_input()?;
                ctx.set_variable(&data.var_name, input.value.clone()).await
            }
            VarOp::Delete => {
                let existed = ctx.delete_variable(&data.var_name).await;
                Ok(json!({ "deleted": existed }))
            }
        }
    }
}

/// `extract` - selects a sub-value by `field` or dot-and-bracket `path`.
pub struct ExtractExecutor;

#[async_trait]
impl NodeExecutor for ExtractExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Extract
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Extract);
        let input = ctx.sole_input()?;
        let path = data
            .path
            .as_deref()
            .or(data.field.as_deref())
            .expect("validated at parse time");
        extract_path(&input.value, path)
    }
}

/// Walk a `a.b[0].c` path into a value. Fails with
/// [`FlowError::PathNotFound`] on any absent step.
pub(crate) fn extract_path(value: &Value, path: &str) -> Result<Value> {
    let not_found = || FlowError::PathNotFound {
        path: path.to_string(),
    };

    let mut current = value.clone();
    for raw_seg in path.split('.') {
        if raw_seg.is_empty() {
            return Err(not_found());
        }
        // each dot segment may carry bracket indexes: "items[0][1]"
        let (key, indexes) = match raw_seg.find('[') {
            Some(open) => (&raw_seg[..open], &raw_seg[open..]),
            None => (raw_seg, ""),
        };

        if !key.is_empty() {
            current = match &current {
                Value::Object(map) => map.get(key).cloned().ok_or_else(not_found)?,
                _ => return Err(not_found()),
            };
        }

        let mut rest = indexes;
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped.find(']').ok_or_else(not_found)?;
            let idx: usize = stripped[..close].parse().map_err(|_| not_found())?;
            current = match &current {
                Value::Array(items) => items.get(idx).cloned().ok_or_else(not_found)?,
                _ => return Err(not_found()),
            };
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            return Err(not_found());
        }
    }
    Ok(current)
}

/// `transform` - pure shape conversion.
pub struct TransformExecutor;

#[async_trait]
impl NodeExecutor for TransformExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Transform
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Transform);
        let input = &ctx.sole_input()?.value;
        let output = match data.transform {
            TransformOp::ToArray => match input {
                Value::Array(_) => input.clone(),
                Value::Null => json!([]),
                Value::Object(map) => Value::Array(map.values().cloned().collect()),
                other => json!([other]),
            },
            TransformOp::ToObject => match input {
                Value::Object(_) => input.clone(),
                Value::Array(items) => {
                    let map: Map<String, Value> = items
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v.clone()))
                        .collect();
                    Value::Object(map)
                }
                other => json!({ "value": other }),
            },
            TransformOp::Flatten => match input {
                Value::Array(items) => {
                    let mut flat = Vec::new();
                    for item in items {
                        match item {
                            Value::Array(inner) => flat.extend(inner.iter().cloned()),
                            other => flat.push(other.clone()),
                        }
                    }
                    Value::Array(flat)
                }
                other => {
                    return Err(FlowError::Domain(format!(
                        "flatten requires a list, got {}",
                        type_name(other)
                    )))
                }
            },
            TransformOp::Keys => match input {
                Value::Object(map) => {
                    Value::Array(map.keys().map(|k| json!(k)).collect())
                }
                other => {
                    return Err(FlowError::Domain(format!(
                        "keys requires a mapping, got {}",
                        type_name(other)
                    )))
                }
            },
            TransformOp::Values => match input {
                Value::Object(map) => Value::Array(map.values().cloned().collect()),
                other => {
                    return Err(FlowError::Domain(format!(
                        "values requires a mapping, got {}",
                        type_name(other)
                    )))
                }
            },
        };
        Ok(output)
    }
}

/// `accumulator` - combines each input into the execution's single
/// accumulator slot and returns the updated value.
pub struct AccumulatorExecutor;

#[async_trait]
impl NodeExecutor for AccumulatorExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Accumulator
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Accumulator);
        let input = ctx.sole_input()?.value.clone();
        let previous = ctx.accumulator_get().await;

        let updated = match data.accum_op {
            AccumOp::Sum => {
                let prev = match &previous {
                    Some(v) => numeric(v, "accumulator sum")?,
                    None => 0.0,
                };
                number(prev + numeric(&input, "accumulator sum")?)
            }
            AccumOp::Product => {
                let prev = match &previous {
                    Some(v) => numeric(v, "accumulator product")?,
                    None => 1.0,
                };
                number(prev * numeric(&input, "accumulator product")?)
            }
            AccumOp::Concat => {
                let mut text = match &previous {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => stringify(other),
                    None => String::new(),
                };
                text.push_str(&stringify(&input));
                Value::String(text)
            }
            AccumOp::Array => {
                let mut items = match previous {
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                items.push(input);
                Value::Array(items)
            }
            AccumOp::Count => {
                let prev = match &previous {
                    Some(v) => numeric(v, "accumulator count")?,
                    None => 0.0,
                };
                number(prev + 1.0)
            }
        };

        ctx.accumulator_set(updated.clone()).await;
        Ok(updated)
    }
}

fn numeric(value: &Value, what: &str) -> Result<f64> {
    as_number(value).ok_or_else(|| {
        FlowError::Domain(format!("{what} requires numbers, got {}", type_name(value)))
    })
}

/// `counter` - increments, decrements, resets, or reads the execution's
/// single numeric counter; returns the counter's new value.
pub struct CounterExecutor;

#[async_trait]
impl NodeExecutor for CounterExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Counter
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Counter);
        let value = match data.counter_op {
            CounterOp::Increment => ctx.counter_increment(data.delta.unwrap_or(1.0)).await,
            CounterOp::Decrement => ctx.counter_increment(-data.delta.unwrap_or(1.0)).await,
            CounterOp::Reset => {
                let target = data.value.unwrap_or(0.0);
                ctx.counter_reset(target).await;
                target
            }
            CounterOp::Get => ctx.counter_get().await,
        };
        Ok(number(value))
    }
}

/// `cache` - get/set/delete on the execution's TTL cache.
pub struct CacheExecutor;

#[async_trait]
impl NodeExecutor for CacheExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Cache
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Cache);
        match data.cache_op {
            CacheOp::Get => {
                let hit = ctx.cache_get(&data.cache_key).await;
                Ok(json!({
                    "found": hit.is_some(),
                    "value": hit.unwrap_or(Value::Null),
                }))
            }
            CacheOp::Set => {
                let input = ctx.sole_input()?.value.clone();
                let ttl = data.cache_ttl.map(|d| d.as_duration());
                ctx.cache_set(&data.cache_key, input.clone(), ttl).await;
                Ok(input)
            }
            CacheOp::Delete => {
                let existed = ctx.cache_delete(&data.cache_key).await;
                Ok(json!({ "deleted": existed }))
            }
        }
    }
}
