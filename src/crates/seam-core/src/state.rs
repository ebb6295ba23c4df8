//! Per-execution state manager
//!
//! Four logical stores scoped to one execution: named variables, a single
//! accumulator slot, a single numeric counter, and a TTL cache. Every store
//! sits behind its own async mutex, so each operation is serialised and a
//! reader observes a consistent snapshot within one call. Nothing survives
//! the execution - the whole manager is dropped with the execution context.

use seam_node::error::{FlowError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// The per-execution state stores.
#[derive(Debug, Default)]
pub struct StateManager {
    variables: Mutex<BTreeMap<String, Value>>,
    accumulator: Mutex<Option<Value>>,
    counter: Mutex<f64>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    // -- variables -----------------------------------------------------------

    pub async fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.lock().await.get(name).cloned()
    }

    /// Set a variable, enforcing the store-cardinality cap. Returns the
    /// stored value.
    pub async fn set_variable(
        &self,
        name: &str,
        value: Value,
        max_variables: u64,
    ) -> Result<Value> {
        let mut vars = self.variables.lock().await;
        if !vars.contains_key(name) && vars.len() as u64 >= max_variables {
            return Err(FlowError::QuotaExceeded {
                resource: "variables".into(),
                limit: max_variables,
            });
        }
        vars.insert(name.to_string(), value.clone());
        Ok(value)
    }

    pub async fn delete_variable(&self, name: &str) -> bool {
        self.variables.lock().await.remove(name).is_some()
    }

    pub async fn list_variables(&self) -> Vec<String> {
        self.variables.lock().await.keys().cloned().collect()
    }

    /// Consistent snapshot of every variable, for expression scopes.
    pub async fn snapshot_variables(&self) -> BTreeMap<String, Value> {
        self.variables.lock().await.clone()
    }

    // -- accumulator ---------------------------------------------------------

    pub async fn accumulator_get(&self) -> Option<Value> {
        self.accumulator.lock().await.clone()
    }

    pub async fn accumulator_set(&self, value: Value) {
        *self.accumulator.lock().await = Some(value);
    }

    pub async fn accumulator_reset(&self) {
        *self.accumulator.lock().await = None;
    }

    /// Read-modify-write under one lock acquisition.
    pub async fn accumulator_update<F>(&self, combine: F) -> Result<Value>
    where
        F: FnOnce(Option<Value>) -> Result<Value>,
    {
        let mut slot = self.accumulator.lock().await;
        let updated = combine(slot.take())?;
        *slot = Some(updated.clone());
        Ok(updated)
    }

    // -- counter -------------------------------------------------------------

    pub async fn counter_get(&self) -> f64 {
        *self.counter.lock().await
    }

    /// Add `delta` (negative to decrement); returns the new value.
    pub async fn counter_increment(&self, delta: f64) -> f64 {
        let mut counter = self.counter.lock().await;
        *counter += delta;
        *counter
    }

    pub async fn counter_reset(&self, value: f64) {
        *self.counter.lock().await = value;
    }

    // -- TTL cache -----------------------------------------------------------

    /// Fetch a live entry. An expired entry reads as absent and is removed
    /// on the spot.
    pub async fn cache_get(&self, key: &str) -> Option<Value> {
        let mut cache = self.cache.lock().await;
        match cache.get(key) {
            Some(entry) if entry.is_expired() => {
                cache.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub async fn cache_set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.cache.lock().await.insert(key.to_string(), entry);
    }

    pub async fn cache_delete(&self, key: &str) -> bool {
        self.cache.lock().await.remove(key).is_some()
    }

    /// Drop every expired entry; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut cache = self.cache.lock().await;
        let before = cache.len();
        cache.retain(|_, entry| !entry.is_expired());
        before - cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn variable_set_then_get_round_trips() {
        let state = StateManager::new();
        state.set_variable("x", json!(41), 10).await.unwrap();
        assert_eq!(state.get_variable("x").await, Some(json!(41)));
        assert!(state.delete_variable("x").await);
        assert_eq!(state.get_variable("x").await, None);
        assert!(!state.delete_variable("x").await);
    }

    #[tokio::test]
    async fn variable_cap_is_enforced() {
        let state = StateManager::new();
        state.set_variable("a", json!(1), 2).await.unwrap();
        state.set_variable("b", json!(2), 2).await.unwrap();
        let err = state.set_variable("c", json!(3), 2).await.unwrap_err();
        assert!(matches!(err, FlowError::QuotaExceeded { .. }));
        // overwriting an existing name stays within the cap
        assert!(state.set_variable("a", json!(9), 2).await.is_ok());
    }

    #[tokio::test]
    async fn counter_laws() {
        let state = StateManager::new();
        state.counter_reset(5.0).await;
        assert_eq!(state.counter_get().await, 5.0);
        assert_eq!(state.counter_increment(3.0).await, 8.0);
        assert_eq!(state.counter_increment(-10.0).await, -2.0);
    }

    #[tokio::test]
    async fn accumulator_update_is_atomic_per_call() {
        let state = StateManager::new();
        let v = state
            .accumulator_update(|prev| {
                assert!(prev.is_none());
                Ok(json!(1))
            })
            .await
            .unwrap();
        assert_eq!(v, json!(1));
        let v = state
            .accumulator_update(|prev| Ok(json!(prev.unwrap().as_i64().unwrap() + 1)))
            .await
            .unwrap();
        assert_eq!(v, json!(2));
        state.accumulator_reset().await;
        assert_eq!(state.accumulator_get().await, None);
    }

    #[tokio::test]
    async fn cache_respects_ttl_on_read() {
        let state = StateManager::new();
        state
            .cache_set("k", json!("v"), Duration::from_secs(60))
            .await;
        assert_eq!(state.cache_get("k").await, Some(json!("v")));

        state.cache_set("gone", json!(1), Duration::ZERO).await;
        assert_eq!(state.cache_get("gone").await, None);
        // the expired entry was removed lazily
        assert_eq!(state.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn purge_drops_only_expired_entries() {
        let state = StateManager::new();
        state.cache_set("live", json!(1), Duration::from_secs(60)).await;
        state.cache_set("dead", json!(2), Duration::ZERO).await;
        assert_eq!(state.purge_expired().await, 1);
        assert_eq!(state.cache_get("live").await, Some(json!(1)));
    }
}
