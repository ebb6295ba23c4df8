//! The execution-context handle executors run against
//!
//! [`ExecutionContext`] is the seam between the engine and node executors:
//! the engine implements it, executors (built-in and plugin) consume it, and
//! neither side sees the other's private structures. Through the handle an
//! executor can fetch its inputs, use the per-execution state manager, read
//! configuration, check the cancellation signal, emit observer events, and
//! evaluate expressions against the execution's scope.

use crate::config::EngineConfig;
use crate::error::{FlowError, Result};
use crate::event::Event;
use crate::node::NodeId;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// One gathered input: where it came from, through which handle, and the
/// value. Inputs appear in the order their edges appear in the payload.
#[derive(Debug, Clone)]
pub struct NodeInput {
    /// Source node id.
    pub source: NodeId,
    /// Handle on the source the edge left through, if any.
    pub handle: Option<String>,
    /// The delivered value.
    pub value: Value,
}

/// Per-execution consumption counters for the protected resources.
///
/// Counters are monotonic; ceilings are enforced by the quota middleware
/// and the engine against the configured limits.
#[derive(Debug)]
pub struct ResourceCounters {
    started_at: Instant,
    node_executions: AtomicU64,
    http_calls: AtomicU64,
    loop_iterations: AtomicU64,
    dispatch_times: Mutex<VecDeque<Instant>>,
}

impl ResourceCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            node_executions: AtomicU64::new(0),
            http_calls: AtomicU64::new(0),
            loop_iterations: AtomicU64::new(0),
            dispatch_times: Mutex::new(VecDeque::new()),
        }
    }

    /// Wall clock consumed so far by this execution.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Record one node invocation; returns the new total.
    pub fn record_node_execution(&self) -> u64 {
        self.node_executions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn node_executions(&self) -> u64 {
        self.node_executions.load(Ordering::Relaxed)
    }

    /// Record one outbound HTTP request; returns the new total.
    pub fn record_http_call(&self) -> u64 {
        self.http_calls.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn http_calls(&self) -> u64 {
        self.http_calls.load(Ordering::Relaxed)
    }

    /// Record loop iterations; returns the new total across all loop nodes.
    pub fn record_loop_iterations(&self, count: u64) -> u64 {
        self.loop_iterations.fetch_add(count, Ordering::Relaxed) + count
    }

    pub fn loop_iterations(&self) -> u64 {
        self.loop_iterations.load(Ordering::Relaxed)
    }

    /// Record a dispatch timestamp and return how many dispatches happened
    /// in the trailing one-second window. Used by the rate-limit middleware.
    pub fn record_dispatch_in_window(&self) -> usize {
        let now = Instant::now();
        let mut times = self.dispatch_times.lock().expect("dispatch window poisoned");
        while let Some(front) = times.front() {
            if now.duration_since(*front) > Duration::from_secs(1) {
                times.pop_front();
            } else {
                break;
            }
        }
        times.push_back(now);
        times.len()
    }
}

impl Default for ResourceCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-node execution handle.
///
/// Implemented by the engine; consumed by executors. All state mutation an
/// executor performs flows through this trait, which keeps the state
/// manager the single point of serialisation.
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    /// Unique identifier of this execution.
    fn execution_id(&self) -> &str;

    /// Id of the node currently executing.
    fn node_id(&self) -> &str;

    /// Immutable configuration snapshot.
    fn config(&self) -> &EngineConfig;

    /// Gathered inputs, in edge order.
    fn inputs(&self) -> &[NodeInput];

    /// Resource-consumption counters for this execution.
    fn resources(&self) -> &ResourceCounters;

    /// The execution's cancellation signal. Executors must observe it at
    /// every suspension point.
    fn cancellation(&self) -> CancellationToken;

    /// Fail fast with [`FlowError::Cancelled`] when the signal has fired.
    fn check_cancelled(&self) -> Result<()>;

    /// The recorded failure of an upstream node, if it failed.
    fn upstream_error(&self, node: &str) -> Option<FlowError>;

    /// The recorded wall clock of an upstream node's execution.
    fn upstream_elapsed(&self, node: &str) -> Option<Duration>;

    /// Emit an observer event through the bus.
    async fn emit(&self, event: Event);

    // -- state manager: variables ------------------------------------------

    async fn get_variable(&self, name: &str) -> Option<Value>;
    /// Set a variable; fails with [`FlowError::QuotaExceeded`] when the
    /// configured variable cap would be exceeded.
    async fn set_variable(&self, name: &str, value: Value) -> Result<Value>;
    async fn delete_variable(&self, name: &str) -> bool;
    async fn list_variables(&self) -> Vec<String>;

    // -- state manager: accumulator ----------------------------------------

    async fn accumulator_get(&self) -> Option<Value>;
    async fn accumulator_set(&self, value: Value);
    async fn accumulator_reset(&self);

    // -- state manager: counter --------------------------------------------

    async fn counter_get(&self) -> f64;
    /// Increment by `delta` (negative to decrement); returns the new value.
    async fn counter_increment(&self, delta: f64) -> f64;
    async fn counter_reset(&self, value: f64);

    // -- state manager: TTL cache ------------------------------------------

    /// Fetch a live entry. Expired entries read as absent.
    async fn cache_get(&self, key: &str) -> Option<Value>;
    /// Store an entry; `ttl` falls back to the configured default.
    async fn cache_set(&self, key: &str, value: Value, ttl: Option<Duration>);
    async fn cache_delete(&self, key: &str) -> bool;

    // -- expressions --------------------------------------------------------

    /// Evaluate an expression (full grammar or shorthand) against this
    /// execution's scope; the node's sole input value backs the shorthand
    /// form.
    async fn evaluate(&self, source: &str) -> Result<Value>;

    /// Render a `{{ expression }}` template string against this
    /// execution's scope.
    async fn render_template(&self, template: &str) -> Result<String>;
}

/// Convenience accessors shared by executors.
pub trait ContextExt: ExecutionContext {
    /// The sole input of a single-input node.
    fn sole_input(&self) -> Result<&NodeInput> {
        match self.inputs() {
            [one] => Ok(one),
            [] => Err(FlowError::Domain(format!(
                "node '{}' requires exactly one input, got none",
                self.node_id()
            ))),
            many => Err(FlowError::Domain(format!(
                "node '{}' requires exactly one input, got {}",
                self.node_id(),
                many.len()
            ))),
        }
    }

    /// The first input's value, if any input was delivered.
    fn first_input_value(&self) -> Option<&Value> {
        self.inputs().first().map(|input| &input.value)
    }

    /// All input values in edge order.
    fn input_values(&self) -> Vec<&Value> {
        self.inputs().iter().map(|input| &input.value).collect()
    }
}

impl<T: ExecutionContext + ?Sized> ContextExt for T {}
