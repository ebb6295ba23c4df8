//! The engine: one workflow execution, end to end
//!
//! [`Engine::run`] drives the whole pipeline:
//!
//! 1. Resolve the payload's nodes (inferring kinds where absent) and
//!    validate every `data` record.
//! 2. Build the graph, compile every expression and template, and union
//!    the implicit edges they reference into the graph.
//! 3. Compute the deterministic topological order (cycle errors surface
//!    here, before any event is emitted).
//! 4. Walk the order, gathering inputs, deciding skips, enforcing resource
//!    ceilings, and dispatching each node through the middleware chain.
//!    Ready nodes feeding the same `parallel` collector are dispatched
//!    concurrently under the collector's declared budget.
//! 5. Emit lifecycle events throughout, and assemble the final report.
//!
//! An engine owns no cross-execution state: two concurrent `run` calls
//! share only the immutable configuration, the registry, and the observer
//! list.
//!
//! ```rust,no_run
//! use seam_core::engine::Engine;
//! use seam_node::node::WorkflowPayload;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new()?;
//! let payload = WorkflowPayload::from_value(json!({
//!     "nodes": [
//!         {"id": "a", "data": {"value": 10}},
//!         {"id": "b", "data": {"value": 5}},
//!         {"id": "c", "type": "operation", "data": {"op": "add"}}
//!     ],
//!     "edges": [
//!         {"source": "a", "target": "c"},
//!         {"source": "b", "target": "c"}
//!     ]
//! }))?;
//! let report = engine.run(payload).await;
//! assert!(report.success);
//! assert_eq!(report.final_output, json!(15));
//! # Ok(())
//! # }
//! ```

use crate::executors::register_builtins;
use crate::expr::{compile, CompiledExpr, Scope, Template};
use crate::graph::FlowGraph;
use crate::middleware::{self, standard_chain, Middleware};
use crate::observer::ObserverBus;
use crate::registry::ExecutorRegistry;
use crate::state::StateManager;
use seam_node::config::EngineConfig;
use seam_node::context::{ExecutionContext, NodeInput, ResourceCounters};
use seam_node::error::{FlowError, Result};
use seam_node::event::{Event, EventKind, EventPayload, Observer};
use seam_node::executor::{NodeExecutor, NodeState};
use seam_node::node::{
    NodeData, NodeId, NodeKind, ValidatedNode, WorkflowPayload,
};
use seam_node::report::{ExecutionReport, ReportError};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Builder for [`Engine`]: configuration, observers, and plugin executors
/// are all fixed at construction.
pub struct EngineBuilder {
    config: EngineConfig,
    observers: Vec<Arc<dyn Observer>>,
    plugins: Vec<Arc<dyn NodeExecutor>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            observers: Vec::new(),
            plugins: Vec::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an observer handler; handlers run in registration order.
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Register a plugin executor for an additional node kind.
    pub fn executor(mut self, executor: Arc<dyn NodeExecutor>) -> Self {
        self.plugins.push(executor);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let http = Arc::new(crate::http::HttpFacade::new(&self.config)?);
        let mut registry = ExecutorRegistry::new();
        register_builtins(&mut registry, http)?;
        for plugin in self.plugins {
            registry.register(plugin)?;
        }
        let mut bus = ObserverBus::new(self.config.observer_handler_timeout);
        for observer in self.observers {
            bus.register(observer);
        }
        Ok(Engine {
            config: Arc::new(self.config),
            registry,
            bus,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The workflow execution engine.
pub struct Engine {
    config: Arc<EngineConfig>,
    registry: ExecutorRegistry,
    bus: ObserverBus,
}

impl Engine {
    /// An engine with default configuration and only the built-in kinds.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one workflow to completion.
    pub async fn run(&self, payload: WorkflowPayload) -> ExecutionReport {
        self.run_cancellable(payload, CancellationToken::new()).await
    }

    /// Execute one workflow from JSON text.
    pub async fn run_json(&self, text: &str) -> ExecutionReport {
        match WorkflowPayload::parse(text) {
            Ok(payload) => self.run(payload).await,
            Err(err) => failed_report(&err, None, Duration::ZERO),
        }
    }

    /// Execute with an external cancellation token; cancelling the token
    /// aborts the execution at the next suspension point.
    pub async fn run_cancellable(
        &self,
        payload: WorkflowPayload,
        token: CancellationToken,
    ) -> ExecutionReport {
        let started = Instant::now();
        match self.plan(&payload) {
            // planning failures (schema, unknown node, cycle, expression
            // compile) report before any event is emitted
            Err(err) => failed_report(&err, None, started.elapsed()),
            Ok(plan) => self.execute(plan, token).await,
        }
    }

    /// Resolve, validate, compile, and order the payload.
    fn plan(&self, payload: &WorkflowPayload) -> Result<Plan> {
        let mut nodes = BTreeMap::new();
        for raw in &payload.nodes {
            let node = ValidatedNode::resolve(raw)?;
            if !self.registry.supports(&node.kind) {
                return Err(FlowError::Schema(format!(
                    "node '{}' has unknown kind '{}'",
                    node.id, node.kind
                )));
            }
            if nodes.insert(node.id.clone(), node).is_some() {
                return Err(FlowError::Schema(format!(
                    "duplicate node id '{}'",
                    raw.id
                )));
            }
        }

        let mut graph = FlowGraph::build(nodes.keys().cloned(), &payload.edges)?;

        let mut expressions = HashMap::new();
        let mut templates = HashMap::new();
        for node in nodes.values() {
            for source in expression_sources(node) {
                let refs: Vec<String> = match source {
                    ExprSource::Expression(text) => {
                        let compiled = compile(text, self.config.expression_max_depth)?;
                        let refs = compiled.referenced_nodes().iter().cloned().collect();
                        expressions.insert(text.to_string(), compiled);
                        refs
                    }
                    ExprSource::Template(text) => {
                        let compiled = Template::compile(text, self.config.expression_max_depth)?;
                        let refs = compiled.referenced_nodes().into_iter().collect();
                        templates.insert(text.to_string(), compiled);
                        refs
                    }
                };
                for referenced in refs {
                    if !graph.contains(&referenced) {
                        return Err(FlowError::UndefinedReference {
                            token: format!("node.{referenced}"),
                        });
                    }
                    graph.add_implicit_edge(&referenced, &node.id)?;
                }
            }
        }

        // the augmented graph must still be acyclic
        let order = graph.topological_order()?;

        // member -> the parallel collector whose feeding subgraph it
        // belongs to (first collector in id order wins)
        let mut group_of = BTreeMap::new();
        for node in nodes.values() {
            if node.kind == NodeKind::Parallel {
                for member in graph.dependencies_of(&node.id) {
                    group_of.entry(member).or_insert_with(|| node.id.clone());
                }
            }
        }

        Ok(Plan {
            nodes,
            graph,
            order,
            expressions,
            templates,
            group_of,
        })
    }

    async fn execute(&self, plan: Plan, token: CancellationToken) -> ExecutionReport {
        let Plan {
            nodes,
            graph,
            order,
            expressions,
            templates,
            group_of,
        } = plan;
        let shared = Shared {
            execution_id: uuid::Uuid::new_v4().to_string(),
            config: Arc::clone(&self.config),
            state: StateManager::new(),
            counters: ResourceCounters::new(),
            token,
            cancel_reason: std::sync::Mutex::new(None),
            expressions,
            templates,
        };
        let chain = standard_chain();

        tracing::info!(
            execution = %shared.execution_id,
            nodes = nodes.len(),
            "workflow started"
        );
        self.emit(&shared, EventKind::WorkflowStarted, None, None).await;

        let mut values: BTreeMap<String, Value> = BTreeMap::new();
        let mut errors: HashMap<String, FlowError> = HashMap::new();
        let mut elapsed: HashMap<String, Duration> = HashMap::new();
        let mut states: BTreeMap<String, NodeState> = order
            .iter()
            .map(|id| (id.clone(), NodeState::Pending))
            .collect();
        let mut failure: Option<(FlowError, String)> = None;

        let mut idx = 0;
        'walk: while idx < order.len() {
            let id = order[idx].clone();
            idx += 1;
            if settled(states[&id]) {
                continue;
            }

            if shared.counters.elapsed() > shared.config.max_execution_time {
                shared.cancel("overall execution time ceiling reached");
                let err = FlowError::Timeout {
                    scope: "execution".into(),
                    elapsed_ms: shared.counters.elapsed().as_millis() as u64,
                };
                failure = Some((err, id.clone()));
                break 'walk;
            }
            if shared.token.is_cancelled() {
                failure = Some((shared.cancelled_error(), id.clone()));
                break 'walk;
            }

            // assemble this step: the node alone, or the ready frontier of
            // its parallel group
            let members = match group_of.get(&id) {
                Some(collector) => {
                    let group = graph.dependencies_of(collector);
                    order[idx - 1..]
                        .iter()
                        .filter(|m| {
                            group.contains(*m)
                                && !settled(states[*m])
                                && graph
                                    .dependencies_of(m)
                                    .iter()
                                    .all(|dep| settled(states[dep]))
                        })
                        .cloned()
                        .collect::<Vec<_>>()
                }
                None => vec![id.clone()],
            };

            // decide skips and gather inputs per member
            let mut runnable: Vec<(&ValidatedNode, Vec<NodeInput>)> = Vec::new();
            for member in &members {
                let node = nodes.get(member).expect("planned nodes stay in the map");
                match gather_inputs(&graph, &nodes, node, &values, &errors, &states) {
                    None => {
                        tracing::debug!(
                            execution = %shared.execution_id,
                            node = %member,
                            "node skipped: no live incoming edge"
                        );
                        states.insert(member.clone(), NodeState::Skipped);
                    }
                    Some(inputs) => {
                        states.insert(member.clone(), NodeState::Ready);
                        runnable.push((node, inputs));
                    }
                }
            }
            if runnable.is_empty() {
                continue;
            }

            for (node, _) in &runnable {
                states.insert(node.id.clone(), NodeState::Running);
                self.emit(&shared, EventKind::NodeStarted, Some(node.id.clone()), None)
                    .await;
            }

            let budget = step_budget(&group_of, &nodes, &id, runnable.len());
            let semaphore = Arc::new(Semaphore::new(budget));
            let outcomes = {
                let values_ref = &values;
                let errors_ref = &errors;
                let elapsed_ref = &elapsed;
                let shared_ref = &shared;
                let chain_ref = &chain;
                let tasks = runnable.iter().map(|(node, inputs)| {
                    let node: &ValidatedNode = node;
                    let semaphore = Arc::clone(&semaphore);
                    let inputs = inputs.clone();
                    async move {
                        let _permit = semaphore
                            .acquire()
                            .await
                            .expect("step semaphore is never closed");
                        let started = Instant::now();
                        let result = self
                            .run_node(
                                shared_ref, chain_ref, node, inputs, values_ref, errors_ref,
                                elapsed_ref,
                            )
                            .await;
                        (node.id.clone(), result, started.elapsed())
                    }
                });
                join_all(tasks).await
            };

            // the sequencer commits results in input order, not completion
            // order
            for (node_id, result, took) in outcomes {
                elapsed.insert(node_id.clone(), took);
                match result {
                    Ok(value) => {
                        states.insert(node_id.clone(), NodeState::Succeeded);
                        self.emit(
                            &shared,
                            EventKind::NodeSucceeded,
                            Some(node_id.clone()),
                            Some(EventPayload::Value(value.clone())),
                        )
                        .await;
                        values.insert(node_id, value);
                    }
                    Err(err) => {
                        states.insert(node_id.clone(), NodeState::Failed);
                        self.emit(
                            &shared,
                            EventKind::NodeFailed,
                            Some(node_id.clone()),
                            Some(EventPayload::error(&err)),
                        )
                        .await;
                        let covered = failure_covered(&graph, &nodes, &node_id);
                        errors.insert(node_id.clone(), err.clone());
                        if !covered && failure.is_none() {
                            failure = Some((err, node_id));
                        }
                    }
                }
            }
            if failure.is_some() {
                break 'walk;
            }
        }

        let elapsed_total = shared.counters.elapsed();
        match &failure {
            None => {
                self.emit(&shared, EventKind::WorkflowSucceeded, None, None).await;
                tracing::info!(
                    execution = %shared.execution_id,
                    elapsed_ms = elapsed_total.as_millis() as u64,
                    "workflow succeeded"
                );
            }
            Some((err, node_id)) => {
                self.emit(
                    &shared,
                    EventKind::WorkflowFailed,
                    Some(node_id.clone()),
                    Some(EventPayload::error(err)),
                )
                .await;
                tracing::warn!(
                    execution = %shared.execution_id,
                    node = %node_id,
                    error = %err,
                    "workflow failed"
                );
            }
        }

        let final_output = final_output(&order, &graph, &values);
        ExecutionReport {
            success: failure.is_none(),
            node_results: values,
            final_output,
            elapsed_ms: elapsed_total.as_millis() as u64,
            error: failure
                .as_ref()
                .map(|(err, node_id)| ReportError::new(err, Some(node_id.clone()))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_node(
        &self,
        shared: &Shared,
        chain: &[Arc<dyn Middleware>],
        node: &ValidatedNode,
        inputs: Vec<NodeInput>,
        values: &BTreeMap<String, Value>,
        errors: &HashMap<String, FlowError>,
        elapsed: &HashMap<String, Duration>,
    ) -> Result<Value> {
        let executor = self.lookup(&node.kind)?;
        let ctx = EngineContext {
            shared,
            bus: &self.bus,
            node_id: node.id.clone(),
            inputs,
            results: values,
            errors,
            elapsed,
        };
        let remaining = shared
            .config
            .max_execution_time
            .saturating_sub(shared.counters.elapsed());
        match tokio::time::timeout(
            remaining,
            middleware::dispatch(chain, executor.as_ref(), &ctx, node),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                shared.cancel("overall execution time ceiling reached");
                Err(FlowError::Timeout {
                    scope: "execution".into(),
                    elapsed_ms: shared.counters.elapsed().as_millis() as u64,
                })
            }
        }
    }

    /// The core kinds are all registered at construction; the registry's
    /// fallback branch serves plugin kinds.
    fn lookup(&self, kind: &NodeKind) -> Result<&Arc<dyn NodeExecutor>> {
        match kind {
            NodeKind::Custom(name) => self.registry.get(kind).ok_or_else(|| {
                FlowError::Schema(format!("no executor registered for kind '{name}'"))
            }),
            _ => self.registry.get(kind).ok_or_else(|| {
                FlowError::executor(kind.as_str(), "built-in executor missing from registry")
            }),
        }
    }

    async fn emit(
        &self,
        shared: &Shared,
        kind: EventKind,
        node_id: Option<String>,
        payload: Option<EventPayload>,
    ) {
        self.bus
            .emit(Event::now(kind, shared.execution_id.clone(), node_id, payload))
            .await;
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("bus", &self.bus)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

struct Plan {
    nodes: BTreeMap<NodeId, ValidatedNode>,
    graph: FlowGraph,
    order: Vec<NodeId>,
    expressions: HashMap<String, CompiledExpr>,
    templates: HashMap<String, Template>,
    group_of: BTreeMap<NodeId, NodeId>,
}

enum ExprSource<'a> {
    Expression(&'a str),
    Template(&'a str),
}

/// Every expression or template occurring in a node's data.
fn expression_sources(node: &ValidatedNode) -> Vec<ExprSource<'_>> {
    let mut sources = Vec::new();
    match &node.data {
        NodeData::Condition(data) => sources.push(ExprSource::Expression(&data.condition)),
        NodeData::WhileLoop(data) => sources.push(ExprSource::Expression(&data.condition)),
        NodeData::Switch(data) => {
            for case in &data.cases {
                sources.push(ExprSource::Expression(&case.when));
            }
        }
        NodeData::Http(data) => {
            if Template::is_templated(&data.url) {
                sources.push(ExprSource::Template(&data.url));
            }
            if let Some(headers) = &data.headers {
                for value in headers.values() {
                    if Template::is_templated(value) {
                        sources.push(ExprSource::Template(value));
                    }
                }
            }
            if let Some(Value::String(body)) = &data.body {
                if Template::is_templated(body) {
                    sources.push(ExprSource::Template(body));
                }
            }
        }
        _ => {}
    }
    sources
}

/// Gather a node's inputs from its explicit incoming edges, in edge order.
///
/// Returns `None` when the node must be skipped: it has incoming edges and
/// none of them is live (source skipped, or an unselected condition /
/// switch / split handle). A failed-but-covered source contributes a null
/// input; its error is visible through the context.
fn gather_inputs(
    graph: &FlowGraph,
    nodes: &BTreeMap<NodeId, ValidatedNode>,
    node: &ValidatedNode,
    values: &BTreeMap<String, Value>,
    errors: &HashMap<String, FlowError>,
    states: &BTreeMap<String, NodeState>,
) -> Option<Vec<NodeInput>> {
    let explicit: Vec<_> = graph
        .incoming_edges(&node.id)
        .iter()
        .filter(|edge| !edge.implicit)
        .collect();
    if explicit.is_empty() {
        return Some(Vec::new());
    }

    let mut inputs = Vec::new();
    for edge in &explicit {
        if states.get(&edge.source) == Some(&NodeState::Skipped) {
            continue;
        }
        if errors.contains_key(&edge.source) {
            inputs.push(NodeInput {
                source: edge.source.clone(),
                handle: edge.handle.clone(),
                value: Value::Null,
            });
            continue;
        }
        let Some(result) = values.get(&edge.source) else {
            continue;
        };
        let source_kind = nodes
            .get(&edge.source)
            .map(|n| &n.kind)
            .expect("edge endpoints were validated at build");
        if let Some(value) = delivered(source_kind, result, edge.handle.as_deref()) {
            inputs.push(NodeInput {
                source: edge.source.clone(),
                handle: edge.handle.clone(),
                value,
            });
        }
    }

    if inputs.is_empty() {
        None
    } else {
        Some(inputs)
    }
}

/// The value an edge delivers from a source node's result, or `None` when
/// the edge is dead (unselected handle).
fn delivered(kind: &NodeKind, result: &Value, handle: Option<&str>) -> Option<Value> {
    let unwrap = |key: &str| result.get(key).cloned().unwrap_or(Value::Null);
    match kind {
        NodeKind::Condition => {
            let path = result.get("path").and_then(Value::as_str);
            match handle {
                Some(h) => (path == Some(h)).then(|| unwrap("value")),
                None => Some(unwrap("value")),
            }
        }
        NodeKind::Switch => {
            let path = result.get("output_path").and_then(Value::as_str);
            match handle {
                Some(h) => (path == Some(h)).then(|| unwrap("value")),
                None => Some(unwrap("value")),
            }
        }
        NodeKind::Split => match handle {
            Some(h) => result.get("outputs").and_then(|outputs| outputs.get(h)).cloned(),
            None => Some(result.clone()),
        },
        _ => Some(result.clone()),
    }
}

/// Concurrency budget for one step: the collector's declared budget when
/// the step is a parallel frontier, otherwise the step size.
fn step_budget(
    group_of: &BTreeMap<NodeId, NodeId>,
    nodes: &BTreeMap<NodeId, ValidatedNode>,
    id: &str,
    step_size: usize,
) -> usize {
    let budget = group_of
        .get(id)
        .and_then(|collector| nodes.get(collector))
        .and_then(|node| match &node.data {
            NodeData::Parallel(data) => data.max_concurrency,
            _ => None,
        })
        .unwrap_or(step_size);
    budget.max(1)
}

/// A node's lifecycle has reached a terminal state.
fn settled(state: NodeState) -> bool {
    matches!(
        state,
        NodeState::Succeeded | NodeState::Failed | NodeState::Skipped
    )
}

/// A failing node halts the walk unless every dependent can absorb the
/// failure: `try_catch`, `retry`, or a `join` with the `any` strategy.
fn failure_covered(
    graph: &FlowGraph,
    nodes: &BTreeMap<NodeId, ValidatedNode>,
    failing: &str,
) -> bool {
    let dependents: BTreeSet<_> = graph
        .outgoing_edges(failing)
        .iter()
        .filter(|edge| !edge.implicit)
        .map(|edge| edge.target.clone())
        .collect();
    if dependents.is_empty() {
        return false;
    }
    dependents.iter().all(|dependent| {
        nodes
            .get(dependent)
            .is_some_and(|node| match (&node.kind, &node.data) {
                (NodeKind::TryCatch, _) | (NodeKind::Retry, _) => true,
                (NodeKind::Join, NodeData::Join(data)) => {
                    data.join_strategy == seam_node::node::JoinStrategy::Any
                }
                _ => false,
            })
    })
}

/// The conventional final output: the value of the terminal node latest in
/// topological order, or a mapping of every terminal when several exist.
fn final_output(
    order: &[NodeId],
    graph: &FlowGraph,
    values: &BTreeMap<String, Value>,
) -> Value {
    let terminals: Vec<&NodeId> = order
        .iter()
        .filter(|id| graph.outgoing_edges(id).is_empty())
        .filter(|id| values.contains_key(*id))
        .collect();
    match terminals.as_slice() {
        [] => Value::Null,
        [only] => values[*only].clone(),
        many => Value::Object(
            many.iter()
                .map(|id| ((*id).clone(), values[*id].clone()))
                .collect(),
        ),
    }
}

fn failed_report(err: &FlowError, node_id: Option<String>, elapsed: Duration) -> ExecutionReport {
    ExecutionReport {
        success: false,
        node_results: BTreeMap::new(),
        final_output: Value::Null,
        elapsed_ms: elapsed.as_millis() as u64,
        error: Some(ReportError::new(err, node_id)),
    }
}

// ---------------------------------------------------------------------------
// execution state and context
// ---------------------------------------------------------------------------

struct Shared {
    execution_id: String,
    config: Arc<EngineConfig>,
    state: StateManager,
    counters: ResourceCounters,
    token: CancellationToken,
    cancel_reason: std::sync::Mutex<Option<String>>,
    expressions: HashMap<String, CompiledExpr>,
    templates: HashMap<String, Template>,
}

impl Shared {
    /// Fire the cancellation signal, keeping the first reason.
    fn cancel(&self, reason: &str) {
        let mut slot = self.cancel_reason.lock().expect("cancel reason poisoned");
        if slot.is_none() {
            *slot = Some(reason.to_string());
        }
        drop(slot);
        self.token.cancel();
    }

    fn cancelled_error(&self) -> FlowError {
        let reason = self
            .cancel_reason
            .lock()
            .expect("cancel reason poisoned")
            .clone()
            .unwrap_or_else(|| "cancelled by caller".to_string());
        FlowError::Cancelled { reason }
    }
}

/// The per-node [`ExecutionContext`] the engine hands executors. Result,
/// error, and elapsed views are snapshots committed by the sequencer, so
/// parallel siblings never observe one another mid-flight.
struct EngineContext<'a> {
    shared: &'a Shared,
    bus: &'a ObserverBus,
    node_id: String,
    inputs: Vec<NodeInput>,
    results: &'a BTreeMap<String, Value>,
    errors: &'a HashMap<String, FlowError>,
    elapsed: &'a HashMap<String, Duration>,
}

impl EngineContext<'_> {
    async fn scope(&self) -> Scope {
        Scope {
            results: self.results.clone(),
            variables: self.shared.state.snapshot_variables().await,
            context: BTreeMap::from([
                (
                    "execution_id".to_string(),
                    Value::String(self.shared.execution_id.clone()),
                ),
                ("node_id".to_string(), Value::String(self.node_id.clone())),
            ]),
            input: self.inputs.first().map(|input| input.value.clone()),
            regex_timeout: self.shared.config.expression_regex_timeout,
        }
    }

    async fn state_changed(&self, store: &str, detail: Value) {
        self.bus
            .emit(Event::now(
                EventKind::StateChanged,
                self.shared.execution_id.clone(),
                Some(self.node_id.clone()),
                Some(EventPayload::Value(
                    serde_json::json!({ "store": store, "detail": detail }),
                )),
            ))
            .await;
    }
}

#[async_trait]
impl ExecutionContext for EngineContext<'_> {
    fn execution_id(&self) -> &str {
        &self.shared.execution_id
    }

    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    fn inputs(&self) -> &[NodeInput] {
        &self.inputs
    }

    fn resources(&self) -> &ResourceCounters {
        &self.shared.counters
    }

    fn cancellation(&self) -> CancellationToken {
        self.shared.token.clone()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.shared.token.is_cancelled() {
            return Err(self.shared.cancelled_error());
        }
        Ok(())
    }

    fn upstream_error(&self, node: &str) -> Option<FlowError> {
        self.errors.get(node).cloned()
    }

    fn upstream_elapsed(&self, node: &str) -> Option<Duration> {
        self.elapsed.get(node).copied()
    }

    async fn emit(&self, event: Event) {
        self.bus.emit(event).await;
    }

    async fn get_variable(&self, name: &str) -> Option<Value> {
        self.shared.state.get_variable(name).await
    }

    async fn set_variable(&self, name: &str, value: Value) -> Result<Value> {
        let stored = self
            .shared
            .state
            .set_variable(name, value, self.shared.config.max_variables)
            .await?;
        self.state_changed("variables", serde_json::json!({ "name": name }))
            .await;
        Ok(stored)
    }

    async fn delete_variable(&self, name: &str) -> bool {
        let existed = self.shared.state.delete_variable(name).await;
        if existed {
            self.state_changed("variables", serde_json::json!({ "name": name, "deleted": true }))
                .await;
        }
        existed
    }

    async fn list_variables(&self) -> Vec<String> {
        self.shared.state.list_variables().await
    }

    async fn accumulator_get(&self) -> Option<Value> {
        self.shared.state.accumulator_get().await
    }

    async fn accumulator_set(&self, value: Value) {
        self.shared.state.accumulator_set(value).await;
        self.state_changed("accumulator", Value::Null).await;
    }

    async fn accumulator_reset(&self) {
        self.shared.state.accumulator_reset().await;
        self.state_changed("accumulator", serde_json::json!({ "reset": true }))
            .await;
    }

    async fn counter_get(&self) -> f64 {
        self.shared.state.counter_get().await
    }

    async fn counter_increment(&self, delta: f64) -> f64 {
        let value = self.shared.state.counter_increment(delta).await;
        self.state_changed("counter", serde_json::json!({ "value": value }))
            .await;
        value
    }

    async fn counter_reset(&self, value: f64) {
        self.shared.state.counter_reset(value).await;
        self.state_changed("counter", serde_json::json!({ "value": value }))
            .await;
    }

    async fn cache_get(&self, key: &str) -> Option<Value> {
        self.shared.state.cache_get(key).await
    }

    async fn cache_set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.shared.config.cache_default_ttl);
        self.shared.state.cache_set(key, value, ttl).await;
        self.state_changed("cache", serde_json::json!({ "key": key }))
            .await;
    }

    async fn cache_delete(&self, key: &str) -> bool {
        let existed = self.shared.state.cache_delete(key).await;
        if existed {
            self.state_changed("cache", serde_json::json!({ "key": key, "deleted": true }))
                .await;
        }
        existed
    }

    async fn evaluate(&self, source: &str) -> Result<Value> {
        let scope = self.scope().await;
        match self.shared.expressions.get(source) {
            Some(compiled) => compiled.evaluate(&scope),
            // expressions reaching executors are compiled during planning;
            // this path serves plugin executors evaluating ad hoc sources
            None => compile(source, self.shared.config.expression_max_depth)?.evaluate(&scope),
        }
    }

    async fn render_template(&self, template: &str) -> Result<String> {
        let scope = self.scope().await;
        match self.shared.templates.get(template) {
            Some(compiled) => compiled.render(&scope),
            None => Template::compile(template, self.shared.config.expression_max_depth)?
                .render(&scope),
        }
    }
}
