//! Executor registry
//!
//! Maps each node kind to exactly one executor. Registration happens once,
//! at engine construction; re-registering a kind is an error, and lookup at
//! dispatch time is a single hash probe. The built-in kinds are registered
//! first; embedders add plugin kinds afterwards through the same interface.

use seam_node::error::{FlowError, Result};
use seam_node::executor::NodeExecutor;
use seam_node::node::NodeKind;
use std::collections::HashMap;
use std::sync::Arc;

/// Kind to executor mapping.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under the kind it reports.
    ///
    /// Fails with [`FlowError::Schema`] when the kind already has an
    /// executor; a registry never holds two implementations for one kind.
    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) -> Result<()> {
        let kind = executor.kind().as_str().to_string();
        if self.executors.contains_key(&kind) {
            return Err(FlowError::Schema(format!(
                "executor for kind '{kind}' is already registered"
            )));
        }
        self.executors.insert(kind, executor);
        Ok(())
    }

    /// Look up the executor for a kind.
    pub fn get(&self, kind: &NodeKind) -> Option<&Arc<dyn NodeExecutor>> {
        self.executors.get(kind.as_str())
    }

    /// Whether a kind has an executor.
    pub fn supports(&self, kind: &NodeKind) -> bool {
        self.executors.contains_key(kind.as_str())
    }

    /// Registered kind names, for diagnostics.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seam_node::context::ExecutionContext;
    use seam_node::node::ValidatedNode;
    use serde_json::Value;

    struct StubExecutor(NodeKind);

    #[async_trait]
    impl NodeExecutor for StubExecutor {
        fn kind(&self) -> NodeKind {
            self.0.clone()
        }

        async fn execute(
            &self,
            _ctx: &dyn ExecutionContext,
            _node: &ValidatedNode,
        ) -> seam_node::error::Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn registration_is_one_shot() {
        let mut registry = ExecutorRegistry::new();
        registry
            .register(Arc::new(StubExecutor(NodeKind::Number)))
            .unwrap();
        let err = registry
            .register(Arc::new(StubExecutor(NodeKind::Number)))
            .unwrap_err();
        assert!(matches!(err, FlowError::Schema(_)));
    }

    #[test]
    fn custom_kinds_share_the_namespace() {
        let mut registry = ExecutorRegistry::new();
        registry
            .register(Arc::new(StubExecutor(NodeKind::Custom("echo".into()))))
            .unwrap();
        assert!(registry.supports(&NodeKind::Custom("echo".into())));
        assert!(!registry.supports(&NodeKind::Custom("other".into())));
        assert_eq!(registry.kinds(), vec!["echo"]);
    }
}
