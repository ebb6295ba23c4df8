//! Lifecycle events and the observer handler interface
//!
//! The engine emits one [`Event`] per lifecycle transition: workflow
//! start/finish, node start/finish, and state-store mutations. Handlers
//! receive immutable copies; a handler cannot reach back into execution
//! state, and a failing or slow handler never poisons the execution (the
//! bus logs and moves on).

use crate::error::{ErrorKind, FlowError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    WorkflowStarted,
    WorkflowSucceeded,
    WorkflowFailed,
    NodeStarted,
    NodeSucceeded,
    NodeFailed,
    StateChanged,
}

/// Optional event payload: a produced value or a recorded error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPayload {
    /// A value snapshot (node result, state-store write, ...).
    Value(Value),
    /// An error record, tagged with its taxonomy kind.
    Error { kind: ErrorKind, message: String },
}

impl EventPayload {
    pub fn error(err: &FlowError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One lifecycle event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Identifier of the execution this event belongs to.
    pub execution_id: String,
    /// The node involved, for node-scoped kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
}

impl Event {
    /// Build an event stamped with the current time.
    pub fn now(
        kind: EventKind,
        execution_id: impl Into<String>,
        node_id: Option<String>,
        payload: Option<EventPayload>,
    ) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            execution_id: execution_id.into(),
            node_id,
            payload,
        }
    }
}

/// An observer handler, registered at engine construction.
///
/// Handlers run synchronously with execution, in registration order. Each
/// invocation is bounded by the configured
/// [`observer_handler_timeout`](crate::config::EngineConfig::observer_handler_timeout);
/// a handler that runs over budget is abandoned for that event.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Handle one event. Errors are logged by the bus and never propagate
    /// into the execution.
    async fn on_event(&self, event: Event) -> std::result::Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds_serialize_kebab_case() {
        let v = serde_json::to_value(EventKind::WorkflowStarted).unwrap();
        assert_eq!(v, serde_json::json!("workflow-started"));
        let v = serde_json::to_value(EventKind::NodeFailed).unwrap();
        assert_eq!(v, serde_json::json!("node-failed"));
    }

    #[test]
    fn error_payload_carries_taxonomy_kind() {
        let err = FlowError::Domain("division by zero".into());
        let payload = EventPayload::error(&err);
        match payload {
            EventPayload::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::Domain);
                assert!(message.contains("division by zero"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
