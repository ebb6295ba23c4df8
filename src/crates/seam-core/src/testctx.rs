//! In-memory [`ExecutionContext`] for unit tests
//!
//! Backs executor and middleware tests without standing up an engine: a
//! real state manager and counters, plus settable inputs, upstream results,
//! and recorded events.

use crate::expr::{compile, Scope, Template};
use crate::state::StateManager;
use seam_node::config::EngineConfig;
use seam_node::context::{ExecutionContext, NodeInput, ResourceCounters};
use seam_node::error::{FlowError, Result};
use seam_node::event::Event;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct TestContext {
    pub config: EngineConfig,
    pub node_id: String,
    pub inputs: Vec<NodeInput>,
    pub results: BTreeMap<String, Value>,
    pub errors: HashMap<String, FlowError>,
    pub elapsed: HashMap<String, Duration>,
    pub events: Mutex<Vec<Event>>,
    pub state: StateManager,
    pub counters: ResourceCounters,
    pub token: CancellationToken,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            node_id: "node-under-test".into(),
            inputs: Vec::new(),
            results: BTreeMap::new(),
            errors: HashMap::new(),
            elapsed: HashMap::new(),
            events: Mutex::new(Vec::new()),
            state: StateManager::new(),
            counters: ResourceCounters::new(),
            token: CancellationToken::new(),
        }
    }

    pub fn with_input(mut self, value: Value) -> Self {
        self.inputs.push(NodeInput {
            source: format!("upstream{}", self.inputs.len()),
            handle: None,
            value,
        });
        self
    }

    pub fn with_named_input(mut self, source: &str, handle: Option<&str>, value: Value) -> Self {
        self.inputs.push(NodeInput {
            source: source.to_string(),
            handle: handle.map(String::from),
            value,
        });
        self
    }

    pub fn with_result(mut self, node: &str, value: Value) -> Self {
        self.results.insert(node.to_string(), value);
        self
    }

    pub fn with_upstream_error(mut self, node: &str, err: FlowError) -> Self {
        self.errors.insert(node.to_string(), err);
        self
    }

    pub fn with_upstream_elapsed(mut self, node: &str, elapsed: Duration) -> Self {
        self.elapsed.insert(node.to_string(), elapsed);
        self
    }

    async fn scope(&self) -> Scope {
        Scope {
            results: self.results.clone(),
            variables: self.state.snapshot_variables().await,
            context: BTreeMap::from([(
                "execution_id".to_string(),
                Value::String(self.execution_id().to_string()),
            )]),
            input: self.inputs.first().map(|i| i.value.clone()),
            regex_timeout: self.config.expression_regex_timeout,
        }
    }
}

#[async_trait]
impl ExecutionContext for TestContext {
    fn execution_id(&self) -> &str {
        "test-execution"
    }

    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn inputs(&self) -> &[NodeInput] {
        &self.inputs
    }

    fn resources(&self) -> &ResourceCounters {
        &self.counters
    }

    fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(FlowError::Cancelled {
                reason: "cancelled by test".into(),
            });
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
        self.events.lock().expect("event log poisoned").push(event);
    }

    async fn get_variable(&self, name: &str) -> Option<Value> {
        self.state.get_variable(name).await
    }

    async fn set_variable(&self, name: &str, value: Value) -> Result<Value> {
        self.state
            .set_variable(name, value, self.config.max_variables)
            .await
    }

    async fn delete_variable(&self, name: &str) -> bool {
        self.state.delete_variable(name).await
    }

    async fn list_variables(&self) -> Vec<String> {
        self.state.list_variables().await
    }

    async fn accumulator_get(&self) -> Option<Value> {
        self.state.accumulator_get().await
    }

    async fn accumulator_set(&self, value: Value) {
        self.state.accumulator_set(value).await
    }

    async fn accumulator_reset(&self) {
        self.state.accumulator_reset().await
    }

    async fn counter_get(&self) -> f64 {
        self.state.counter_get().await
    }

    async fn counter_increment(&self, delta: f64) -> f64 {
        self.state.counter_increment(delta).await
    }

    async fn counter_reset(&self, value: f64) {
        self.state.counter_reset(value).await
    }

    async fn cache_get(&self, key: &str) -> Option<Value> {
        self.state.cache_get(key).await
    }

    async fn cache_set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.config.cache_default_ttl);
        self.state.cache_set(key, value, ttl).await
    }

    async fn cache_delete(&self, key: &str) -> bool {
        self.state.cache_delete(key).await
    }

    async fn evaluate(&self, source: &str) -> Result<Value> {
        let compiled = compile(source, self.config.expression_max_depth)?;
        compiled.evaluate(&self.scope().await)
    }

    async fn render_template(&self, template: &str) -> Result<String> {
        let compiled = Template::compile(template, self.config.expression_max_depth)?;
        compiled.render(&self.scope().await)
    }
}
