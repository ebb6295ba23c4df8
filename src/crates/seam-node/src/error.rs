//! Error taxonomy for workflow validation and execution
//!
//! Every failure the engine can surface carries exactly one [`FlowError`]
//! variant. The taxonomy is closed: executors that fail in ways the engine
//! does not recognise are wrapped in [`FlowError::Executor`].
//!
//! # Error Hierarchy
//!
//! ```text
//! FlowError
//! ├── Schema             - payload shape invalid (unknown kind/field)
//! ├── UnknownNode        - edge endpoint refers to a missing node
//! ├── Cycle              - dependency cycle, with one concrete path
//! ├── Syntax             - expression parse failure (line, column)
//! ├── UndefinedReference - expression references an unknown name
//! ├── Type               - expression type violation
//! ├── RegexTimeout       - matches() exceeded its wall-clock budget
//! ├── Domain             - numeric/type violation inside an executor
//! ├── PathNotFound       - extract path refers to an absent key
//! ├── QuotaExceeded      - a configured resource ceiling tripped
//! ├── LoopLimit          - a loop node's own iteration ceiling tripped
//! ├── Timeout            - per-node or overall wall-clock ceiling
//! ├── Cancelled          - cancellation signal fired
//! ├── SsrfBlocked        - outbound URL failed the address guard
//! ├── ResponseTooLarge   - HTTP body exceeded the byte cap
//! ├── HttpTransport      - outbound HTTP transport fault
//! └── Executor           - catch-all for unexpected executor failures
//! ```
//!
//! Errors are `Clone` so the engine can record a node's failure in its
//! result bookkeeping and still hand a copy to downstream `try_catch` /
//! `retry` consumers.

use serde::Serialize;
use thiserror::Error;

/// Convenience result type using [`FlowError`].
pub type Result<T> = std::result::Result<T, FlowError>;

/// Closed error taxonomy for all workflow operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// Payload shape invalid: unknown node kind, missing required field, or
    /// an unknown key inside a node's `data` record.
    #[error("invalid workflow payload: {0}")]
    Schema(String),

    /// An edge endpoint references a node id that is not in the node set.
    #[error("edge references unknown node '{node}'")]
    UnknownNode {
        /// The missing node id.
        node: String,
    },

    /// The augmented graph (explicit plus implicit edges) contains a cycle.
    ///
    /// `path` is one concrete cycle: a node sequence whose first and last
    /// entries are equal.
    #[error("workflow contains a cycle: {}", path.join(" -> "))]
    Cycle {
        /// One concrete cycle through the graph.
        path: Vec<String>,
    },

    /// Expression failed to parse.
    #[error("expression syntax error at {line}:{col}: {message}")]
    Syntax {
        /// 1-based line of the offending token.
        line: usize,
        /// 1-based column of the offending token.
        col: usize,
        /// What the parser expected or rejected.
        message: String,
    },

    /// Expression references an unknown function, root, or node id.
    #[error("undefined reference '{token}' in expression")]
    UndefinedReference {
        /// The unresolved token.
        token: String,
    },

    /// Operand types incompatible with the operator or function.
    #[error("expression type error: {0}")]
    Type(String),

    /// A `matches()` call exceeded the configured per-match wall clock.
    #[error("regex match exceeded time budget for pattern '{pattern}'")]
    RegexTimeout {
        /// The pattern that ran over budget.
        pattern: String,
    },

    /// Numeric or type violation inside an executor (divide by zero,
    /// non-numeric operand to an arithmetic operation, ...).
    #[error("domain error: {0}")]
    Domain(String),

    /// An extract path selected a key or index that does not exist.
    #[error("path '{path}' not found in value")]
    PathNotFound {
        /// The path that failed to resolve.
        path: String,
    },

    /// A configured resource ceiling tripped.
    #[error("quota exceeded: {resource} limit of {limit} reached")]
    QuotaExceeded {
        /// Which resource ran out (node executions, variables, http calls, ...).
        resource: String,
        /// The configured ceiling.
        limit: u64,
    },

    /// A loop node exhausted its own `max_iterations`.
    #[error("loop '{node}' exceeded its iteration limit of {limit}")]
    LoopLimit {
        /// The loop node id.
        node: String,
        /// The iteration ceiling that tripped.
        limit: u64,
    },

    /// A wall-clock ceiling tripped, per node or for the whole execution.
    #[error("'{scope}' timed out after {elapsed_ms}ms")]
    Timeout {
        /// What timed out: a node id or `"execution"`.
        scope: String,
        /// Elapsed wall clock when the ceiling tripped.
        elapsed_ms: u64,
    },

    /// The cancellation signal fired before or during this operation.
    #[error("execution cancelled: {reason}")]
    Cancelled {
        /// First recorded cancellation reason.
        reason: String,
    },

    /// The outbound URL (or one of its redirect hops) resolved into the
    /// blocked address space.
    #[error("request to '{url}' blocked: {reason}")]
    SsrfBlocked {
        /// The offending URL.
        url: String,
        /// Which rule rejected it.
        reason: String,
    },

    /// An HTTP response body exceeded the configured byte cap.
    #[error("response body exceeded {limit} bytes")]
    ResponseTooLarge {
        /// The configured cap in bytes.
        limit: u64,
    },

    /// Transport-level HTTP failure: connect, TLS, read, or protocol error.
    #[error("http transport error: {0}")]
    HttpTransport(String),

    /// Catch-all wrapping an unexpected failure inside an executor.
    #[error("executor '{kind}' failed: {cause}")]
    Executor {
        /// The node kind whose executor failed.
        kind: String,
        /// Human-readable cause.
        cause: String,
    },
}

impl FlowError {
    /// Wrap an unexpected executor failure.
    pub fn executor(kind: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Executor {
            kind: kind.into(),
            cause: cause.into(),
        }
    }

    /// Build a schema error from any displayable cause.
    pub fn schema(cause: impl std::fmt::Display) -> Self {
        Self::Schema(cause.to_string())
    }

    /// The stable machine-readable tag for this error, as reported in
    /// [`ExecutionReport::error`](crate::report::ReportError) and in
    /// `node-failed` observer payloads.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_) => ErrorKind::Schema,
            Self::UnknownNode { .. } => ErrorKind::UnknownNode,
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::Syntax { .. } => ErrorKind::Syntax,
            Self::UndefinedReference { .. } => ErrorKind::UndefinedReference,
            Self::Type(_) => ErrorKind::Type,
            Self::RegexTimeout { .. } => ErrorKind::RegexTimeout,
            Self::Domain(_) => ErrorKind::Domain,
            Self::PathNotFound { .. } => ErrorKind::PathNotFound,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::LoopLimit { .. } => ErrorKind::LoopLimit,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::SsrfBlocked { .. } => ErrorKind::SsrfBlocked,
            Self::ResponseTooLarge { .. } => ErrorKind::ResponseTooLarge,
            Self::HttpTransport(_) => ErrorKind::HttpTransport,
            Self::Executor { .. } => ErrorKind::Executor,
        }
    }
}

/// Machine-readable error tags, one per [`FlowError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Schema,
    UnknownNode,
    Cycle,
    Syntax,
    UndefinedReference,
    Type,
    RegexTimeout,
    Domain,
    PathNotFound,
    QuotaExceeded,
    LoopLimit,
    Timeout,
    Cancelled,
    SsrfBlocked,
    ResponseTooLarge,
    HttpTransport,
    Executor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_formats_path() {
        let err = FlowError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "workflow contains a cycle: a -> b -> a");
    }

    #[test]
    fn error_kind_is_stable() {
        let err = FlowError::QuotaExceeded {
            resource: "http_calls".into(),
            limit: 100,
        };
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert_eq!(
            serde_json::to_value(err.kind()).unwrap(),
            serde_json::json!("quota_exceeded")
        );
    }

    #[test]
    fn errors_clone_for_result_bookkeeping() {
        let err = FlowError::Domain("division by zero".into());
        let copy = err.clone();
        assert_eq!(err, copy);
    }
}
