//! Workflow payload model: nodes, edges, and per-kind data records
//!
//! A workflow arrives as a JSON document with two top-level keys, `nodes`
//! and `edges`. Each node carries a kind tag (possibly absent, in which case
//! the engine infers it from the shape of `data`) and a `data` record whose
//! permitted fields depend on the kind.
//!
//! The conflated "bag of optional fields" of the wire format is normalised
//! into one typed record per kind ([`NodeData`]); every per-kind record is
//! `deny_unknown_fields`, so schema violations surface during
//! deserialization rather than deep inside an executor.
//!
//! ```rust
//! use seam_node::node::{WorkflowPayload, NodeKind};
//!
//! let payload: WorkflowPayload = serde_json::from_str(r#"{
//!     "nodes": [
//!         {"id": "a", "data": {"value": 10}},
//!         {"id": "b", "type": "condition", "data": {"condition": ">5"}}
//!     ],
//!     "edges": [{"source": "a", "target": "b"}]
//! }"#).unwrap();
//!
//! assert_eq!(payload.nodes.len(), 2);
//! assert_eq!(payload.nodes[1].kind, Some(NodeKind::Condition));
//! ```

use crate::error::{FlowError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Node identifier, unique within one workflow.
pub type NodeId = String;

/// Closed enumeration of node kinds, plus an escape hatch for kinds
/// registered through the plugin interface.
///
/// Wire form is `snake_case` (`"while_loop"`, `"text_operation"`, ...).
/// A kind string the engine does not recognise becomes [`NodeKind::Custom`];
/// whether it is acceptable is decided at dispatch time against the
/// executor registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Number,
    TextInput,
    Constant,
    Visualization,
    Operation,
    TextOperation,
    Http,
    Condition,
    Switch,
    ForEach,
    WhileLoop,
    Parallel,
    Join,
    Split,
    Variable,
    Extract,
    Transform,
    Accumulator,
    Counter,
    Cache,
    Retry,
    TryCatch,
    Timeout,
    Delay,
    /// A kind registered by an embedder through the executor registry.
    Custom(String),
}

impl NodeKind {
    /// Stable string form, used for registry lookup and logging.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Number => "number",
            Self::TextInput => "text_input",
            Self::Constant => "constant",
            Self::Visualization => "visualization",
            Self::Operation => "operation",
            Self::TextOperation => "text_operation",
            Self::Http => "http",
            Self::Condition => "condition",
            Self::Switch => "switch",
            Self::ForEach => "for_each",
            Self::WhileLoop => "while_loop",
            Self::Parallel => "parallel",
            Self::Join => "join",
            Self::Split => "split",
            Self::Variable => "variable",
            Self::Extract => "extract",
            Self::Transform => "transform",
            Self::Accumulator => "accumulator",
            Self::Counter => "counter",
            Self::Cache => "cache",
            Self::Retry => "retry",
            Self::TryCatch => "try_catch",
            Self::Timeout => "timeout",
            Self::Delay => "delay",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "number" => Self::Number,
            "text_input" => Self::TextInput,
            "constant" => Self::Constant,
            "visualization" => Self::Visualization,
            "operation" => Self::Operation,
            "text_operation" => Self::TextOperation,
            "http" => Self::Http,
            "condition" => Self::Condition,
            "switch" => Self::Switch,
            "for_each" => Self::ForEach,
            "while_loop" => Self::WhileLoop,
            "parallel" => Self::Parallel,
            "join" => Self::Join,
            "split" => Self::Split,
            "variable" => Self::Variable,
            "extract" => Self::Extract,
            "transform" => Self::Transform,
            "accumulator" => Self::Accumulator,
            "counter" => Self::Counter,
            "cache" => Self::Cache,
            "retry" => Self::Retry,
            "try_catch" => Self::TryCatch,
            "timeout" => Self::Timeout,
            "delay" => Self::Delay,
            _ => Self::Custom(s),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node as it appears on the wire, before kind resolution and data
/// validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Node {
    /// Stable identifier, unique within the workflow.
    pub id: NodeId,
    /// Kind tag. When absent the engine infers it from `data` (see
    /// [`infer_kind`]).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    /// Kind-specific data record, validated against the kind's
    /// [`NodeData`] variant.
    #[serde(default)]
    pub data: Value,
}

/// A directed connection between two nodes, optionally leaving through a
/// named output handle (`"true"`/`"false"` on a condition, a path name on a
/// split, a case's `output_path` on a switch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Edge {
    /// Source node id.
    pub source: NodeId,
    /// Target node id.
    pub target: NodeId,
    /// Output handle on the source this edge leaves through.
    #[serde(
        rename = "sourceHandle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,
}

/// The inbound workflow document: an unordered node set and an unordered
/// edge set. Unknown top-level keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowPayload {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl WorkflowPayload {
    /// Parse a payload from JSON text, mapping shape violations to
    /// [`FlowError::Schema`].
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(FlowError::schema)
    }

    /// Parse a payload from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(FlowError::schema)
    }
}

// ---------------------------------------------------------------------------
// Per-kind operation enums
// ---------------------------------------------------------------------------

/// Arithmetic operation of an `operation` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOp {
    /// Whether `name` names an arithmetic operation. Used by kind inference
    /// to tell `operation` apart from `text_operation`.
    pub fn is_math_name(name: &str) -> bool {
        matches!(name, "add" | "subtract" | "multiply" | "divide")
    }
}

/// String operation of a `text_operation` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOp {
    Uppercase,
    Lowercase,
    Titlecase,
    Camelcase,
    Inversecase,
    Concat,
    Repeat,
    Trim,
}

/// How a `join` node combines its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// All input values, in input order.
    #[default]
    All,
    /// First non-null value; tolerates failed predecessors as long as one
    /// input succeeded.
    Any,
    /// First non-null value; the first input must have succeeded.
    First,
}

/// Operation of a `variable` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarOp {
    Get,
    Set,
    Delete,
}

/// Shape conversion of a `transform` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOp {
    ToArray,
    ToObject,
    Flatten,
    Keys,
    Values,
}

/// Combine operation of an `accumulator` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumOp {
    Sum,
    Product,
    Concat,
    Array,
    Count,
}

/// Operation of a `counter` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterOp {
    Increment,
    Decrement,
    Reset,
    Get,
}

/// Operation of a `cache` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOp {
    Get,
    Set,
    Delete,
}

/// Backoff shape of a `retry` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Constant,
    #[default]
    Linear,
    Exponential,
}

// ---------------------------------------------------------------------------
// Duration field
// ---------------------------------------------------------------------------

/// A duration in node data, accepted either as a humantime string
/// (`"250ms"`, `"5s"`, `"2m"`) or as a bare number of milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationField(pub Duration);

impl DurationField {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for DurationField {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl Serialize for DurationField {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(self.0))
    }
}

impl<'de> Deserialize<'de> for DurationField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error as _;
        let raw = Value::deserialize(deserializer)?;
        match raw {
            Value::String(s) => humantime::parse_duration(s.trim())
                .map(DurationField)
                .map_err(|e| D::Error::custom(format!("invalid duration '{s}': {e}"))),
            Value::Number(n) => {
                let ms = n
                    .as_u64()
                    .ok_or_else(|| D::Error::custom(format!("invalid duration: {n}")))?;
                Ok(DurationField(Duration::from_millis(ms)))
            }
            other => Err(D::Error::custom(format!(
                "expected duration string or milliseconds, got {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind data records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumberData {
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextInputData {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstantData {
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisualizationData {
    /// Display hint for the front-end (`"table"`, `"chart"`, `"json"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationData {
    pub op: MathOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextOperationData {
    pub op: TextOp,
    /// Repeat count; required when `op` is [`TextOp::Repeat`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpData {
    /// Request URL; may contain `{{ expression }}` template segments.
    pub url: String,
    /// HTTP method, defaulting to GET.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Extra request headers; values may contain template segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Request body. A string body may contain template segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionData {
    /// Predicate expression, full grammar or shorthand (`">100"`).
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchCase {
    /// Predicate expression or shorthand, tested against the input value.
    pub when: String,
    /// Handle selected when this case matches.
    pub output_path: String,
    /// Optional value to emit instead of the input value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchData {
    /// Ordered case list; first match wins.
    pub cases: Vec<SwitchCase>,
    /// Handle selected when no case matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForEachData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
}

impl ForEachData {
    pub const DEFAULT_MAX_ITERATIONS: u64 = 1000;

    pub fn limit(&self) -> u64 {
        self.max_iterations.unwrap_or(Self::DEFAULT_MAX_ITERATIONS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhileLoopData {
    /// Loop predicate, evaluated against the current value.
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
}

impl WhileLoopData {
    pub const DEFAULT_MAX_ITERATIONS: u64 = 100;

    pub fn limit(&self) -> u64 {
        self.max_iterations.unwrap_or(Self::DEFAULT_MAX_ITERATIONS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParallelData {
    /// Declared concurrency budget for the subgraph feeding this collector.
    /// Defaults to the number of inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinData {
    #[serde(default)]
    pub join_strategy: JoinStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitData {
    /// Named output paths; defaults to `["a", "b"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
}

impl SplitData {
    pub fn paths(&self) -> Vec<String> {
        self.paths
            .clone()
            .unwrap_or_else(|| vec!["a".to_string(), "b".to_string()])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableData {
    pub var_op: VarOp,
    pub var_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractData {
    /// Single mapping key to select.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Dot-and-bracket path (`"user.emails[0]"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformData {
    pub transform: TransformOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccumulatorData {
    pub accum_op: AccumOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterData {
    pub counter_op: CounterOp,
    /// Step for increment/decrement; defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    /// Target for reset; defaults to 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheData {
    pub cache_op: CacheOp,
    pub cache_key: String,
    /// Entry time-to-live; falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<DurationField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffKind>,
    /// Base backoff interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<DurationField>,
}

impl RetryData {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

    pub fn attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(Self::DEFAULT_MAX_ATTEMPTS).max(1)
    }

    pub fn base_interval(&self) -> Duration {
        self.interval
            .map(|d| d.as_duration())
            .unwrap_or(Self::DEFAULT_INTERVAL)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TryCatchData {
    /// Value emitted when the upstream failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutData {
    /// Ceiling applied to the upstream node's recorded wall clock.
    pub duration: DurationField,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayData {
    pub duration: DurationField,
}

// ---------------------------------------------------------------------------
// Tagged node data
// ---------------------------------------------------------------------------

/// One validated `data` record per node kind.
///
/// Construction goes through [`NodeData::validate_for`], so holding a
/// `NodeData` implies the record passed both deserialization
/// (`deny_unknown_fields`) and the kind's structural checks.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Number(NumberData),
    TextInput(TextInputData),
    Constant(ConstantData),
    Visualization(VisualizationData),
    Operation(OperationData),
    TextOperation(TextOperationData),
    Http(HttpData),
    Condition(ConditionData),
    Switch(SwitchData),
    ForEach(ForEachData),
    WhileLoop(WhileLoopData),
    Parallel(ParallelData),
    Join(JoinData),
    Split(SplitData),
    Variable(VariableData),
    Extract(ExtractData),
    Transform(TransformData),
    Accumulator(AccumulatorData),
    Counter(CounterData),
    Cache(CacheData),
    Retry(RetryData),
    TryCatch(TryCatchData),
    Timeout(TimeoutData),
    Delay(DelayData),
    /// Raw data for plugin kinds; validated by the plugin executor.
    Custom(Value),
}

fn decode<T: serde::de::DeserializeOwned>(kind: &NodeKind, raw: &Value) -> Result<T> {
    serde_json::from_value(raw.clone())
        .map_err(|e| FlowError::Schema(format!("node data invalid for kind '{kind}': {e}")))
}

impl NodeData {
    /// Validate a raw `data` value against `kind`, producing the typed
    /// record or a [`FlowError::Schema`] naming the violation.
    pub fn validate_for(kind: &NodeKind, raw: &Value) -> Result<Self> {
        let empty = Value::Object(serde_json::Map::new());
        let raw = if raw.is_null() { &empty } else { raw };
        let data = match kind {
            NodeKind::Number => Self::Number(decode(kind, raw)?),
            NodeKind::TextInput => Self::TextInput(decode(kind, raw)?),
            NodeKind::Constant => Self::Constant(decode(kind, raw)?),
            NodeKind::Visualization => Self::Visualization(decode(kind, raw)?),
            NodeKind::Operation => Self::Operation(decode(kind, raw)?),
            NodeKind::TextOperation => {
                let data: TextOperationData = decode(kind, raw)?;
                if data.op == TextOp::Repeat && data.count.is_none() {
                    return Err(FlowError::Schema(
                        "text_operation 'repeat' requires a 'count'".into(),
                    ));
                }
                Self::TextOperation(data)
            }
            NodeKind::Http => {
                let data: HttpData = decode(kind, raw)?;
                if data.url.trim().is_empty() {
                    return Err(FlowError::Schema("http node requires a non-empty 'url'".into()));
                }
                Self::Http(data)
            }
            NodeKind::Condition => Self::Condition(decode(kind, raw)?),
            NodeKind::Switch => {
                let data: SwitchData = decode(kind, raw)?;
                if data.cases.is_empty() && data.default_path.is_none() {
                    return Err(FlowError::Schema(
                        "switch requires at least one case or a default_path".into(),
                    ));
                }
                Self::Switch(data)
            }
            NodeKind::ForEach => Self::ForEach(decode(kind, raw)?),
            NodeKind::WhileLoop => Self::WhileLoop(decode(kind, raw)?),
            NodeKind::Parallel => Self::Parallel(decode(kind, raw)?),
            NodeKind::Join => Self::Join(decode(kind, raw)?),
            NodeKind::Split => {
                let data: SplitData = decode(kind, raw)?;
                if matches!(&data.paths, Some(paths) if paths.is_empty()) {
                    return Err(FlowError::Schema("split 'paths' must be non-empty".into()));
                }
                Self::Split(data)
            }
            NodeKind::Variable => Self::Variable(decode(kind, raw)?),
            NodeKind::Extract => {
                let data: ExtractData = decode(kind, raw)?;
                if data.field.is_none() && data.path.is_none() {
                    return Err(FlowError::Schema(
                        "extract requires 'field' or 'path'".into(),
                    ));
                }
                Self::Extract(data)
            }
            NodeKind::Transform => Self::Transform(decode(kind, raw)?),
            NodeKind::Accumulator => Self::Accumulator(decode(kind, raw)?),
            NodeKind::Counter => Self::Counter(decode(kind, raw)?),
            NodeKind::Cache => {
                let data: CacheData = decode(kind, raw)?;
                if data.cache_key.is_empty() {
                    return Err(FlowError::Schema("cache requires a non-empty 'cache_key'".into()));
                }
                Self::Cache(data)
            }
            NodeKind::Retry => Self::Retry(decode(kind, raw)?),
            NodeKind::TryCatch => Self::TryCatch(decode(kind, raw)?),
            NodeKind::Timeout => Self::Timeout(decode(kind, raw)?),
            NodeKind::Delay => Self::Delay(decode(kind, raw)?),
            NodeKind::Custom(_) => Self::Custom(raw.clone()),
        };
        Ok(data)
    }
}

/// A node after kind resolution and data validation; what executors see.
#[derive(Debug, Clone)]
pub struct ValidatedNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub data: NodeData,
}

impl ValidatedNode {
    /// Resolve a raw payload node: infer the kind when absent, then
    /// validate the data record.
    pub fn resolve(node: &Node) -> Result<Self> {
        let kind = match &node.kind {
            Some(kind) => kind.clone(),
            None => infer_kind(&node.data).ok_or_else(|| {
                FlowError::Schema(format!(
                    "node '{}' has no type and its data matches no known kind",
                    node.id
                ))
            })?,
        };
        let data = NodeData::validate_for(&kind, &node.data)?;
        Ok(Self {
            id: node.id.clone(),
            kind,
            data,
        })
    }
}

/// Infer a node's kind from the keys present in its `data` record.
///
/// The probe order is a fixed priority list; the first marker present wins.
/// Returns `None` when nothing matches.
pub fn infer_kind(data: &Value) -> Option<NodeKind> {
    let obj = data.as_object()?;
    let has = |key: &str| obj.contains_key(key);

    if has("cases") {
        return Some(NodeKind::Switch);
    }
    if has("join_strategy") {
        return Some(NodeKind::Join);
    }
    if has("paths") {
        return Some(NodeKind::Split);
    }
    if has("cache_op") {
        return Some(NodeKind::Cache);
    }
    if has("var_op") {
        return Some(NodeKind::Variable);
    }
    if has("counter_op") {
        return Some(NodeKind::Counter);
    }
    if has("accum_op") {
        return Some(NodeKind::Accumulator);
    }
    if has("url") {
        return Some(NodeKind::Http);
    }
    if has("condition") {
        // A condition carrying loop markers is a while loop.
        if has("max_iterations") {
            return Some(NodeKind::WhileLoop);
        }
        return Some(NodeKind::Condition);
    }
    if has("duration") {
        return Some(NodeKind::Delay);
    }
    if has("retry") || has("attempts") || has("max_attempts") || has("backoff") {
        return Some(NodeKind::Retry);
    }
    if has("transform") {
        return Some(NodeKind::Transform);
    }
    if has("field") || has("path") {
        return Some(NodeKind::Extract);
    }
    if has("text") {
        return Some(NodeKind::TextInput);
    }
    if let Some(value) = obj.get("value") {
        if value.is_number() {
            return Some(NodeKind::Number);
        }
        return Some(NodeKind::Constant);
    }
    if let Some(op) = obj.get("op").and_then(Value::as_str) {
        if MathOp::is_math_name(op) {
            return Some(NodeKind::Operation);
        }
        return Some(NodeKind::TextOperation);
    }
    if has("fallback_value") {
        return Some(NodeKind::TryCatch);
    }
    if has("max_concurrency") {
        return Some(NodeKind::Parallel);
    }
    if has("mode") {
        return Some(NodeKind::Visualization);
    }
    None
}
