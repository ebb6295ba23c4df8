//! Engine configuration
//!
//! A process-wide immutable record. The engine snapshots it at construction;
//! executors read it through the execution context and never mutate it.

use std::time::Duration;

/// Resource ceilings and tuning knobs for one engine instance.
///
/// All fields have the documented defaults; embedders override the ones
/// they care about:
///
/// ```rust
/// use seam_node::config::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig {
///     max_http_calls: 10,
///     max_execution_time: Duration::from_secs(5),
///     ..EngineConfig::default()
/// };
/// assert_eq!(config.max_node_executions, 10_000);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Overall wall-clock ceiling per execution.
    pub max_execution_time: Duration,
    /// Total node invocations allowed per execution.
    pub max_node_executions: u64,
    /// Outbound HTTP requests allowed per execution.
    pub max_http_calls: u64,
    /// Per-loop-node iteration ceiling (loops may declare a lower one).
    pub max_loop_iterations: u64,
    /// Variable-store cardinality per execution.
    pub max_variables: u64,
    /// Byte cap on each HTTP response body.
    pub max_response_size: u64,
    /// Outbound HTTP connect timeout.
    pub http_timeout_connect: Duration,
    /// Outbound HTTP read timeout.
    pub http_timeout_read: Duration,
    /// Outbound HTTP overall request timeout.
    pub http_timeout_overall: Duration,
    /// HTTP redirect hop limit; every hop re-runs URL validation.
    pub http_max_redirects: u32,
    /// When non-empty, only these hostnames may be fetched (takes
    /// precedence over the block rules).
    pub http_allow_hosts: Vec<String>,
    /// Extra CIDR ranges to block, on top of the built-in private /
    /// loopback / link-local / metadata set. `"10.0.0.0/8"` notation.
    pub http_block_cidrs: Vec<String>,
    /// Default TTL for cache-node entries without an explicit one.
    pub cache_default_ttl: Duration,
    /// Expression parser recursion-depth cap.
    pub expression_max_depth: usize,
    /// Wall-clock budget for one `matches()` regex evaluation.
    pub expression_regex_timeout: Duration,
    /// Wall-clock budget for one observer handler invocation.
    pub observer_handler_timeout: Duration,
    /// Optional per-node wall-clock ceiling applied by the timeout
    /// middleware. `None` leaves only the overall ceiling.
    pub max_node_duration: Option<Duration>,
    /// Optional node-dispatch rate limit (executions per second) applied
    /// by the rate-limit middleware. `None` disables it.
    pub node_rate_limit: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_execution_time: Duration::from_secs(60),
            max_node_executions: 10_000,
            max_http_calls: 100,
            max_loop_iterations: 10_000,
            max_variables: 1_000,
            max_response_size: 10 * 1024 * 1024,
            http_timeout_connect: Duration::from_secs(10),
            http_timeout_read: Duration::from_secs(10),
            http_timeout_overall: Duration::from_secs(30),
            http_max_redirects: 10,
            http_allow_hosts: Vec::new(),
            http_block_cidrs: Vec::new(),
            cache_default_ttl: Duration::from_secs(300),
            expression_max_depth: 64,
            expression_regex_timeout: Duration::from_millis(100),
            observer_handler_timeout: Duration::from_millis(100),
            max_node_duration: None,
            node_rate_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_execution_time, Duration::from_secs(60));
        assert_eq!(config.max_node_executions, 10_000);
        assert_eq!(config.max_http_calls, 100);
        assert_eq!(config.max_response_size, 10 * 1024 * 1024);
        assert_eq!(config.http_max_redirects, 10);
        assert_eq!(config.cache_default_ttl, Duration::from_secs(300));
        assert_eq!(config.expression_max_depth, 64);
        assert!(config.http_allow_hosts.is_empty());
    }
}
