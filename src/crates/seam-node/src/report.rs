//! Outbound execution result

use crate::error::{ErrorKind, FlowError};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// The error record carried by a failed [`ExecutionReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ReportError {
    /// Taxonomy tag of the first error in topological order.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// The node that failed, when the error is node-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl ReportError {
    pub fn new(err: &FlowError, node_id: Option<String>) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            node_id,
        }
    }
}

/// The structured result of one workflow execution.
///
/// On failure, `node_results` still holds every value produced before the
/// failing node, and `error` reports the first error in topological order.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub success: bool,
    /// Per-node produced values; skipped and failed nodes have no entry.
    pub node_results: BTreeMap<String, Value>,
    /// Value of the terminal node; with several terminals, a mapping from
    /// terminal node id to value.
    pub final_output: Value,
    /// Wall-clock duration of the execution in milliseconds.
    pub elapsed_ms: u64,
    /// Present only when `success` is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_report_serializes_error_kind() {
        let report = ExecutionReport {
            success: false,
            node_results: BTreeMap::from([("a".to_string(), json!(10))]),
            final_output: Value::Null,
            elapsed_ms: 3,
            error: Some(ReportError::new(
                &FlowError::Domain("division by zero".into()),
                Some("div".into()),
            )),
        };
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["error"]["kind"], json!("domain"));
        assert_eq!(v["error"]["node_id"], json!("div"));
        assert_eq!(v["node_results"]["a"], json!(10));
    }

    #[test]
    fn successful_report_omits_error() {
        let report = ExecutionReport {
            success: true,
            node_results: BTreeMap::new(),
            final_output: json!(15),
            elapsed_ms: 1,
            error: None,
        };
        let v = serde_json::to_value(&report).unwrap();
        assert!(v.get("error").is_none());
    }
}
