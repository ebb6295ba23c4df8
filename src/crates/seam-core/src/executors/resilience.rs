//! Resilience nodes: retry, try/catch, timeout, delay

use super::expect_data;
use seam_node::context::{ContextExt, ExecutionContext};
use seam_node::error::{FlowError, Result};
use seam_node::executor::NodeExecutor;
use seam_node::node::{BackoffKind, NodeKind, ValidatedNode};
use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;

/// `retry` - re-checks its input slot up to `max_attempts` times with the
/// declared backoff. The upstream node is never re-invoked; under the
/// minimal semantics the attempt loop re-reads the recorded outcome, so a
/// persistently failed input consumes the whole schedule and reports
/// `succeeded: false`.
pub struct RetryExecutor;

#[async_trait]
impl NodeExecutor for RetryExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Retry
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Retry);
        let input = ctx.sole_input()?.clone();
        let max_attempts = data.attempts();
        let backoff = data.backoff.unwrap_or_default();
        let base = data.base_interval();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match ctx.upstream_error(&input.source) {
                None => {
                    return Ok(json!({
                        "value": input.value,
                        "attempts": attempt,
                        "succeeded": true,
                    }));
                }
                Some(err) => {
                    if attempt >= max_attempts {
                        return Ok(json!({
                            "value": Value::Null,
                            "attempts": attempt,
                            "succeeded": false,
                            "error": err.to_string(),
                        }));
                    }
                    let delay = backoff_delay(backoff, base, attempt);
                    tracing::debug!(
                        node = %node.id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retry input still failed, backing off"
                    );
                    sleep_cancellable(ctx, delay).await?;
                }
            }
        }
    }
}

fn backoff_delay(kind: BackoffKind, base: Duration, attempt: u32) -> Duration {
    let scaled = match kind {
        BackoffKind::Constant => base,
        BackoffKind::Linear => base.saturating_mul(attempt),
        BackoffKind::Exponential => base.saturating_mul(1u32 << (attempt - 1).min(16)),
    };
    // jitter spreads concurrent retry schedules apart
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    scaled.mul_f64(factor)
}

async fn sleep_cancellable(ctx: &dyn ExecutionContext, duration: Duration) -> Result<()> {
    let token = ctx.cancellation();
    tokio::select! {
        _ = token.cancelled() => Err(FlowError::Cancelled {
            reason: "cancelled while sleeping".into(),
        }),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// `try_catch` - absorbs an upstream failure into `fallback_value`;
/// passes a healthy input through untouched.
pub struct TryCatchExecutor;

#[async_trait]
impl NodeExecutor for TryCatchExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::TryCatch
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, TryCatch);
        let input = ctx.sole_input()?;
        match ctx.upstream_error(&input.source) {
            Some(err) => Ok(json!({
                "value": data.fallback_value.clone().unwrap_or(Value::Null),
                "used_fallback": true,
                "error": err.to_string(),
            })),
            None => Ok(json!({
                "value": input.value,
                "used_fallback": false,
            })),
        }
    }
}

/// `timeout` - fails with [`FlowError::Timeout`] when the upstream node's
/// recorded wall clock exceeded the ceiling; otherwise passes the value
/// through.
pub struct TimeoutExecutor;

#[async_trait]
impl NodeExecutor for TimeoutExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Timeout
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Timeout);
        let input = ctx.sole_input()?;
        let ceiling = data.duration.as_duration();
        let elapsed = ctx.upstream_elapsed(&input.source).unwrap_or(Duration::ZERO);
        if elapsed > ceiling {
            return Err(FlowError::Timeout {
                scope: input.source.clone(),
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
        Ok(input.value.clone())
    }
}

/// `delay` - sleeps for the declared duration, observing cancellation,
/// then reports the input unchanged.
pub struct DelayExecutor;

#[async_trait]
impl NodeExecutor for DelayExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Delay
    }

    async fn execute(&self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        let data = expect_data!(node, Delay);
        let input = ctx.sole_input()?;
        let duration = data.duration.as_duration();
        sleep_cancellable(ctx, duration).await?;
        Ok(json!({
            "value": input.value,
            "delayed": true,
            "duration": format!("{}ms", duration.as_millis()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testctx::TestContext;
    use seam_node::node::{
        DelayData, DurationField, NodeData, RetryData, TimeoutData, TryCatchData,
    };

    fn retry_node(max_attempts: Option<u32>) -> ValidatedNode {
        ValidatedNode {
            id: "r".into(),
            kind: NodeKind::Retry,
            data: NodeData::Retry(RetryData {
                max_attempts,
                backoff: Some(BackoffKind::Constant),
                interval: Some(DurationField::from(Duration::from_millis(1))),
            }),
        }
    }

    #[tokio::test]
    async fn retry_passes_a_healthy_input_through() {
        let ctx = TestContext::new().with_named_input("up", None, json!(5));
        let out = RetryExecutor.execute(&ctx, &retry_node(Some(3))).await.unwrap();
        assert_eq!(out, json!({"value": 5, "attempts": 1, "succeeded": true}));
    }

    #[tokio::test]
    async fn retry_exhausts_attempts_against_a_failed_input() {
        let ctx = TestContext::new()
            .with_named_input("up", None, Value::Null)
            .with_upstream_error("up", FlowError::Domain("boom".into()));
        let out = RetryExecutor.execute(&ctx, &retry_node(Some(3))).await.unwrap();
        assert_eq!(out["succeeded"], json!(false));
        assert_eq!(out["attempts"], json!(3));
        assert!(out["error"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn retry_backoff_observes_cancellation() {
        let ctx = TestContext::new()
            .with_named_input("up", None, Value::Null)
            .with_upstream_error("up", FlowError::Domain("boom".into()));
        ctx.token.cancel();
        let node = ValidatedNode {
            id: "r".into(),
            kind: NodeKind::Retry,
            data: NodeData::Retry(RetryData {
                max_attempts: Some(5),
                backoff: Some(BackoffKind::Exponential),
                interval: Some(DurationField::from(Duration::from_secs(60))),
            }),
        };
        let err = RetryExecutor.execute(&ctx, &node).await.unwrap_err();
        assert!(matches!(err, FlowError::Cancelled { .. }));
    }

    #[test]
    fn backoff_shapes_scale_with_attempts() {
        let base = Duration::from_millis(100);
        // jitter is in [0.5, 1.5); compare against the jitter-free bounds
        let constant = backoff_delay(BackoffKind::Constant, base, 3);
        assert!(constant >= base / 2 && constant < base * 3 / 2);
        let linear = backoff_delay(BackoffKind::Linear, base, 3);
        assert!(linear >= base * 3 / 2 && linear < base * 9 / 2);
        let expo = backoff_delay(BackoffKind::Exponential, base, 3);
        assert!(expo >= base * 2 && expo < base * 6);
    }

    fn try_catch_node(fallback: Option<Value>) -> ValidatedNode {
        ValidatedNode {
            id: "tc".into(),
            kind: NodeKind::TryCatch,
            data: NodeData::TryCatch(TryCatchData {
                fallback_value: fallback,
            }),
        }
    }

    #[tokio::test]
    async fn try_catch_passes_success_through() {
        let ctx = TestContext::new().with_named_input("up", None, json!("fine"));
        let out = TryCatchExecutor
            .execute(&ctx, &try_catch_node(Some(json!("fallback"))))
            .await
            .unwrap();
        assert_eq!(out, json!({"value": "fine", "used_fallback": false}));
    }

    #[tokio::test]
    async fn try_catch_substitutes_the_fallback() {
        let ctx = TestContext::new()
            .with_named_input("up", None, Value::Null)
            .with_upstream_error("up", FlowError::Domain("division by zero".into()));
        let out = TryCatchExecutor
            .execute(&ctx, &try_catch_node(Some(json!(-1))))
            .await
            .unwrap();
        assert_eq!(out["value"], json!(-1));
        assert_eq!(out["used_fallback"], json!(true));
        assert!(out["error"].as_str().unwrap().contains("division by zero"));
    }

    #[tokio::test]
    async fn timeout_checks_recorded_upstream_wall_clock() {
        let node = ValidatedNode {
            id: "to".into(),
            kind: NodeKind::Timeout,
            data: NodeData::Timeout(TimeoutData {
                duration: DurationField::from(Duration::from_millis(100)),
            }),
        };

        let ctx = TestContext::new()
            .with_named_input("up", None, json!(1))
            .with_upstream_elapsed("up", Duration::from_millis(50));
        assert_eq!(TimeoutExecutor.execute(&ctx, &node).await.unwrap(), json!(1));

        let ctx = TestContext::new()
            .with_named_input("up", None, json!(1))
            .with_upstream_elapsed("up", Duration::from_millis(150));
        let err = TimeoutExecutor.execute(&ctx, &node).await.unwrap_err();
        assert_eq!(err, FlowError::Timeout { scope: "up".into(), elapsed_ms: 150 });
    }

    #[tokio::test(start_paused = true)]
    async fn delay_sleeps_then_reports() {
        let ctx = TestContext::new().with_input(json!("x"));
        let node = ValidatedNode {
            id: "d".into(),
            kind: NodeKind::Delay,
            data: NodeData::Delay(DelayData {
                duration: DurationField::from(Duration::from_secs(3)),
            }),
        };
        let out = DelayExecutor.execute(&ctx, &node).await.unwrap();
        assert_eq!(out["delayed"], json!(true));
        assert_eq!(out["value"], json!("x"));
        assert_eq!(out["duration"], json!("3000ms"));
    }

    #[tokio::test]
    async fn delay_observes_cancellation() {
        let ctx = TestContext::new().with_input(json!(1));
        ctx.token.cancel();
        let node = ValidatedNode {
            id: "d".into(),
            kind: NodeKind::Delay,
            data: NodeData::Delay(DelayData {
                duration: DurationField::from(Duration::from_secs(60)),
            }),
        };
        let err = DelayExecutor.execute(&ctx, &node).await.unwrap_err();
        assert!(matches!(err, FlowError::Cancelled { .. }));
    }
}
