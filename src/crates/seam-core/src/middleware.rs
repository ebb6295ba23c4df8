//! Middleware chain wrapping every executor dispatch
//!
//! Each node execution flows through an ordered list of middleware; every
//! frame receives the context, the node, and a continuation it may observe
//! or short-circuit. The order is fixed when the engine is constructed:
//!
//! ```text
//! validation -> logging -> rate-limit -> timeout -> quota -> executor
//! ```
//!
//! The innermost frame is always the executor itself.

use seam_node::context::ExecutionContext;
use seam_node::error::{FlowError, Result};
use seam_node::executor::NodeExecutor;
use seam_node::node::ValidatedNode;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One frame of the dispatch chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        ctx: &dyn ExecutionContext,
        node: &ValidatedNode,
        next: Next<'_>,
    ) -> Result<Value>;
}

/// Continuation through the rest of the chain and, finally, the executor.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    executor: &'a dyn NodeExecutor,
}

impl<'a> Next<'a> {
    /// Run the remainder of the chain.
    pub async fn run(self, ctx: &dyn ExecutionContext, node: &ValidatedNode) -> Result<Value> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    chain: rest,
                    executor: self.executor,
                };
                head.handle(ctx, node, next).await
            }
            None => self.executor.execute(ctx, node).await,
        }
    }

    /// The executor at the end of the chain.
    pub fn executor(&self) -> &'a dyn NodeExecutor {
        self.executor
    }
}

/// Dispatch one node through a chain and its executor.
pub async fn dispatch(
    chain: &[Arc<dyn Middleware>],
    executor: &dyn NodeExecutor,
    ctx: &dyn ExecutionContext,
    node: &ValidatedNode,
) -> Result<Value> {
    Next { chain, executor }.run(ctx, node).await
}

/// The standard chain, in its fixed order. Instances carry per-execution
/// state (the validation cache, the dispatch-rate window lives in the
/// context's counters), so the engine builds a fresh chain per execution.
pub fn standard_chain() -> Vec<Arc<dyn Middleware>> {
    vec![
        Arc::new(ValidationMiddleware::default()),
        Arc::new(LoggingMiddleware),
        Arc::new(RateLimitMiddleware),
        Arc::new(TimeoutMiddleware),
        Arc::new(QuotaMiddleware),
    ]
}

/// Invokes the executor's `validate` once per node per execution and
/// replays the cached outcome on re-dispatch (loop-adjacent nodes can be
/// dispatched more than once).
#[derive(Default)]
pub struct ValidationMiddleware {
    outcomes: Mutex<HashMap<String, Option<FlowError>>>,
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    async fn handle(
        &self,
        ctx: &dyn ExecutionContext,
        node: &ValidatedNode,
        next: Next<'_>,
    ) -> Result<Value> {
        let cached = {
            let outcomes = self.outcomes.lock().expect("validation cache poisoned");
            outcomes.get(&node.id).cloned()
        };
        let outcome = match cached {
            Some(outcome) => outcome,
            None => {
                let outcome = next.executor().validate(node).err();
                self.outcomes
                    .lock()
                    .expect("validation cache poisoned")
                    .insert(node.id.clone(), outcome.clone());
                outcome
            }
        };
        if let Some(err) = outcome {
            return Err(err);
        }
        next.run(ctx, node).await
    }
}

/// Emits a structured start/stop record around every dispatch.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        ctx: &dyn ExecutionContext,
        node: &ValidatedNode,
        next: Next<'_>,
    ) -> Result<Value> {
        tracing::debug!(
            execution = %ctx.execution_id(),
            node = %node.id,
            kind = %node.kind,
            "executing node"
        );
        let started = Instant::now();
        let result = next.run(ctx, node).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::debug!(
                execution = %ctx.execution_id(),
                node = %node.id,
                kind = %node.kind,
                duration_ms,
                "node succeeded"
            ),
            Err(err) => tracing::warn!(
                execution = %ctx.execution_id(),
                node = %node.id,
                kind = %node.kind,
                duration_ms,
                error = %err,
                "node failed"
            ),
        }
        result
    }
}

/// Bounds node dispatches per second per execution, when configured.
pub struct RateLimitMiddleware;

#[async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        ctx: &dyn ExecutionContext,
        node: &ValidatedNode,
        next: Next<'_>,
    ) -> Result<Value> {
        if let Some(limit) = ctx.config().node_rate_limit {
            let in_window = ctx.resources().record_dispatch_in_window();
            if in_window > limit as usize {
                return Err(FlowError::QuotaExceeded {
                    resource: "node_dispatch_rate".into(),
                    limit: limit as u64,
                });
            }
        }
        next.run(ctx, node).await
    }
}

/// Enforces the per-node wall-clock ceiling, when configured.
pub struct TimeoutMiddleware;

#[async_trait]
impl Middleware for TimeoutMiddleware {
    async fn handle(
        &self,
        ctx: &dyn ExecutionContext,
        node: &ValidatedNode,
        next: Next<'_>,
    ) -> Result<Value> {
        match ctx.config().max_node_duration {
            Some(ceiling) => match tokio::time::timeout(ceiling, next.run(ctx, node)).await {
                Ok(result) => result,
                Err(_) => Err(FlowError::Timeout {
                    scope: node.id.clone(),
                    elapsed_ms: ceiling.as_millis() as u64,
                }),
            },
            None => next.run(ctx, node).await,
        }
    }
}

/// Bumps the execution-count counter and fails once the configured ceiling
/// is crossed.
pub struct QuotaMiddleware;

#[async_trait]
impl Middleware for QuotaMiddleware {
    async fn handle(
        &self,
        ctx: &dyn ExecutionContext,
        node: &ValidatedNode,
        next: Next<'_>,
    ) -> Result<Value> {
        let total = ctx.resources().record_node_execution();
        let limit = ctx.config().max_node_executions;
        if total > limit {
            return Err(FlowError::QuotaExceeded {
                resource: "node_executions".into(),
                limit,
            });
        }
        next.run(ctx, node).await
    }
}
