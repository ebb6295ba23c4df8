//! End-to-end workflow executions
//!
//! These tests drive the engine through complete payloads: literal JSON
//! documents the way the front-end submits them, plus builder-constructed
//! ones.

use seam_core::builder::WorkflowBuilder;
use seam_core::engine::Engine;
use seam_core::observer::ChannelObserver;
use seam_node::config::EngineConfig;
use seam_node::error::ErrorKind;
use seam_node::event::EventKind;
use seam_node::node::{MathOp, NodeKind, WorkflowPayload};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_stream::StreamExt;

fn payload(value: Value) -> WorkflowPayload {
    WorkflowPayload::from_value(value).unwrap()
}

#[tokio::test]
async fn simple_arithmetic() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "a", "data": {"value": 10}},
                {"id": "b", "data": {"value": 5}},
                {"id": "c", "type": "operation", "data": {"op": "add"}}
            ],
            "edges": [
                {"source": "a", "target": "c"},
                {"source": "b", "target": "c"}
            ]
        })))
        .await;

    assert!(report.success, "unexpected error: {:?}", report.error);
    assert_eq!(report.node_results["c"], json!(15));
    assert_eq!(report.final_output, json!(15));
}

#[tokio::test]
async fn conditional_branch_skips_the_unselected_path() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "x", "data": {"value": 42}},
                {"id": "y", "type": "condition", "data": {"condition": ">100"}},
                {"id": "t", "data": {"text": "big"}},
                {"id": "f", "data": {"text": "small"}}
            ],
            "edges": [
                {"source": "x", "target": "y"},
                {"source": "y", "target": "t", "sourceHandle": "true"},
                {"source": "y", "target": "f", "sourceHandle": "false"}
            ]
        })))
        .await;

    assert!(report.success);
    assert!(!report.node_results.contains_key("t"), "t must be skipped");
    assert_eq!(report.node_results["f"], json!("small"));
    assert_eq!(report.final_output, json!("small"));
}

#[tokio::test]
async fn skip_propagates_through_downstream_nodes() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "x", "data": {"value": 42}},
                {"id": "y", "type": "condition", "data": {"condition": ">100"}},
                {"id": "t", "data": {"text": "big"}},
                {"id": "sink", "type": "visualization", "data": {"mode": "text"}}
            ],
            "edges": [
                {"source": "x", "target": "y"},
                {"source": "y", "target": "t", "sourceHandle": "true"},
                {"source": "t", "target": "sink"}
            ]
        })))
        .await;

    assert!(report.success);
    assert!(!report.node_results.contains_key("t"));
    assert!(!report.node_results.contains_key("sink"));
}

#[tokio::test]
async fn while_loop_with_false_condition_reports_zero_iterations() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "n", "data": {"value": 0}},
                {"id": "w", "type": "while_loop", "data": {"condition": ">5", "max_iterations": 10}}
            ],
            "edges": [{"source": "n", "target": "w"}]
        })))
        .await;

    assert!(report.success);
    assert_eq!(
        report.node_results["w"],
        json!({"final_value": 0, "iterations": 0, "condition": ">5"})
    );
}

#[tokio::test]
async fn while_loop_with_constant_condition_trips_its_limit() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "n", "data": {"value": 0}},
                {"id": "w", "type": "while_loop", "data": {"condition": "==0", "max_iterations": 10}}
            ],
            "edges": [{"source": "n", "target": "w"}]
        })))
        .await;

    assert!(!report.success);
    let error = report.error.unwrap();
    assert_eq!(error.kind, ErrorKind::LoopLimit);
    assert_eq!(error.node_id.as_deref(), Some("w"));
    // partial results survive the failure
    assert_eq!(report.node_results["n"], json!(0));
}

#[tokio::test]
async fn cache_set_then_get_hits_within_ttl() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "value", "type": "constant", "data": {"value": {"answer": 42}}},
                {"id": "store", "type": "cache", "data": {"cache_op": "set", "cache_key": "answer"}},
                {"id": "load", "type": "cache", "data": {"cache_op": "get", "cache_key": "answer"}}
            ],
            "edges": [
                {"source": "value", "target": "store"},
                {"source": "store", "target": "load"}
            ]
        })))
        .await;

    assert!(report.success);
    assert_eq!(
        report.node_results["load"],
        json!({"found": true, "value": {"answer": 42}})
    );
}

#[tokio::test]
async fn ssrf_guard_blocks_the_metadata_endpoint() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "fetch", "type": "http",
                 "data": {"url": "http://169.254.169.254/latest/meta-data/"}}
            ],
            "edges": []
        })))
        .await;

    assert!(!report.success);
    assert_eq!(report.error.unwrap().kind, ErrorKind::SsrfBlocked);
}

#[tokio::test]
async fn expression_references_create_implicit_edges() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "a", "data": {"value": 10}},
                {"id": "b", "data": {"value": 5}},
                {"id": "c", "type": "condition",
                 "data": {"condition": "node.a.value > node.b.value"}}
            ],
            "edges": []
        })))
        .await;

    assert!(report.success, "unexpected error: {:?}", report.error);
    assert_eq!(report.node_results["c"]["matched"], json!(true));
    assert_eq!(report.node_results.len(), 3);
}

#[tokio::test]
async fn template_references_order_the_http_node_after_its_source() {
    let engine = Engine::new().unwrap();
    // no explicit edges: the template's node reference must order `host`
    // first, and the rendered URL then trips the loopback guard
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "host", "type": "constant", "data": {"value": "127.0.0.1"}},
                {"id": "fetch", "type": "http",
                 "data": {"url": "http://{{ node.host.value }}/status"}}
            ],
            "edges": []
        })))
        .await;

    assert!(!report.success);
    assert_eq!(report.node_results["host"], json!("127.0.0.1"));
    assert_eq!(report.error.unwrap().kind, ErrorKind::SsrfBlocked);
}

#[tokio::test]
async fn divide_by_zero_fails_with_domain_error() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(
            WorkflowBuilder::new()
                .number("a", 10.0)
                .number("z", 0.0)
                .operation("div", MathOp::Divide)
                .edge("a", "div")
                .edge("z", "div")
                .build(),
        )
        .await;

    assert!(!report.success);
    let error = report.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Domain);
    assert_eq!(error.node_id.as_deref(), Some("div"));
    // partial results are reported
    assert_eq!(report.node_results["a"], json!(10));
    assert_eq!(report.node_results["z"], json!(0));
}

#[tokio::test]
async fn try_catch_absorbs_an_upstream_failure() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "a", "data": {"value": 10}},
                {"id": "z", "data": {"value": 0}},
                {"id": "div", "type": "operation", "data": {"op": "divide"}},
                {"id": "safe", "type": "try_catch", "data": {"fallback_value": -1}}
            ],
            "edges": [
                {"source": "a", "target": "div"},
                {"source": "z", "target": "div"},
                {"source": "div", "target": "safe"}
            ]
        })))
        .await;

    assert!(report.success, "try_catch must absorb the failure");
    assert!(!report.node_results.contains_key("div"));
    assert_eq!(report.node_results["safe"]["value"], json!(-1));
    assert_eq!(report.node_results["safe"]["used_fallback"], json!(true));
}

#[tokio::test]
async fn retry_exhausts_its_schedule_against_a_dead_input() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "a", "data": {"value": 10}},
                {"id": "z", "data": {"value": 0}},
                {"id": "div", "type": "operation", "data": {"op": "divide"}},
                {"id": "again", "type": "retry",
                 "data": {"max_attempts": 2, "backoff": "constant", "interval": "1ms"}}
            ],
            "edges": [
                {"source": "a", "target": "div"},
                {"source": "z", "target": "div"},
                {"source": "div", "target": "again"}
            ]
        })))
        .await;

    assert!(report.success);
    assert_eq!(report.node_results["again"]["succeeded"], json!(false));
    assert_eq!(report.node_results["again"]["attempts"], json!(2));
}

#[tokio::test]
async fn join_any_survives_a_failed_branch() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "a", "data": {"value": 10}},
                {"id": "z", "data": {"value": 0}},
                {"id": "div", "type": "operation", "data": {"op": "divide"}},
                {"id": "ok", "data": {"text": "fallback path"}},
                {"id": "j", "type": "join", "data": {"join_strategy": "any"}}
            ],
            "edges": [
                {"source": "a", "target": "div"},
                {"source": "z", "target": "div"},
                {"source": "div", "target": "j"},
                {"source": "ok", "target": "j"}
            ]
        })))
        .await;

    assert!(report.success, "unexpected error: {:?}", report.error);
    assert_eq!(report.node_results["j"], json!("fallback path"));
}

#[tokio::test]
async fn parallel_collects_in_input_order() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "n1", "data": {"value": 1}},
                {"id": "n2", "data": {"value": 2}},
                {"id": "n3", "data": {"value": 3}},
                {"id": "collect", "type": "parallel", "data": {"max_concurrency": 2}}
            ],
            "edges": [
                {"source": "n1", "target": "collect"},
                {"source": "n2", "target": "collect"},
                {"source": "n3", "target": "collect"}
            ]
        })))
        .await;

    assert!(report.success);
    assert_eq!(
        report.node_results["collect"],
        json!({"results": [1, 2, 3], "concurrency": 2})
    );
}

#[tokio::test]
async fn switch_routes_to_the_selected_path_only() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "n", "data": {"value": 15}},
                {"id": "sw", "type": "switch", "data": {
                    "cases": [
                        {"when": ">100", "output_path": "huge"},
                        {"when": ">10", "output_path": "big"}
                    ],
                    "default_path": "rest"
                }},
                {"id": "big_sink", "data": {"text": "took big"}},
                {"id": "rest_sink", "data": {"text": "took rest"}}
            ],
            "edges": [
                {"source": "n", "target": "sw"},
                {"source": "sw", "target": "big_sink", "sourceHandle": "big"},
                {"source": "sw", "target": "rest_sink", "sourceHandle": "rest"}
            ]
        })))
        .await;

    assert!(report.success);
    assert_eq!(report.node_results["big_sink"], json!("took big"));
    assert!(!report.node_results.contains_key("rest_sink"));
}

#[tokio::test]
async fn split_delivers_per_path_values() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "n", "data": {"value": 9}},
                {"id": "s", "type": "split", "data": {"paths": ["left", "right"]}},
                {"id": "l", "type": "visualization", "data": {"mode": "raw"}},
                {"id": "r", "type": "visualization", "data": {"mode": "raw"}}
            ],
            "edges": [
                {"source": "n", "target": "s"},
                {"source": "s", "target": "l", "sourceHandle": "left"},
                {"source": "s", "target": "r", "sourceHandle": "right"}
            ]
        })))
        .await;

    assert!(report.success);
    assert_eq!(report.node_results["l"]["value"], json!(9));
    assert_eq!(report.node_results["r"]["value"], json!(9));
}

#[tokio::test]
async fn variables_flow_between_nodes_through_the_state_manager() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "n", "data": {"value": 7}},
                {"id": "put", "type": "variable", "data": {"var_op": "set", "var_name": "x"}},
                {"id": "take", "type": "variable", "data": {"var_op": "get", "var_name": "x"}}
            ],
            "edges": [
                {"source": "n", "target": "put"},
                {"source": "put", "target": "take"}
            ]
        })))
        .await;

    assert!(report.success);
    assert_eq!(report.node_results["take"], json!(7));
}

#[tokio::test]
async fn extract_and_transform_compose() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "doc", "type": "constant",
                 "data": {"value": {"user": {"tags": ["a", "b"]}}}},
                {"id": "tags", "type": "extract", "data": {"path": "user.tags"}},
                {"id": "shaped", "type": "transform", "data": {"transform": "to_object"}}
            ],
            "edges": [
                {"source": "doc", "target": "tags"},
                {"source": "tags", "target": "shaped"}
            ]
        })))
        .await;

    assert!(report.success);
    assert_eq!(report.node_results["tags"], json!(["a", "b"]));
    assert_eq!(report.node_results["shaped"], json!({"0": "a", "1": "b"}));
}

#[tokio::test]
async fn extract_missing_path_fails_with_path_not_found() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "doc", "type": "constant", "data": {"value": {"a": 1}}},
                {"id": "ex", "type": "extract", "data": {"path": "missing.key"}}
            ],
            "edges": [{"source": "doc", "target": "ex"}]
        })))
        .await;

    assert!(!report.success);
    assert_eq!(report.error.unwrap().kind, ErrorKind::PathNotFound);
}

#[tokio::test]
async fn node_execution_quota_halts_the_walk() {
    let engine = Engine::builder()
        .config(EngineConfig {
            max_node_executions: 2,
            ..EngineConfig::default()
        })
        .build()
        .unwrap();
    let report = engine
        .run(
            WorkflowBuilder::new()
                .number("a", 1.0)
                .number("b", 2.0)
                .number("c", 3.0)
                .build(),
        )
        .await;

    assert!(!report.success);
    let error = report.error.unwrap();
    assert_eq!(error.kind, ErrorKind::QuotaExceeded);
    // the first two nodes in topological order completed
    assert_eq!(report.node_results.len(), 2);
}

#[tokio::test]
async fn overall_timeout_cuts_a_long_delay_short() {
    let engine = Engine::builder()
        .config(EngineConfig {
            max_execution_time: Duration::from_millis(100),
            ..EngineConfig::default()
        })
        .build()
        .unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "n", "data": {"value": 1}},
                {"id": "wait", "type": "delay", "data": {"duration": "30s"}}
            ],
            "edges": [{"source": "n", "target": "wait"}]
        })))
        .await;

    assert!(!report.success);
    assert_eq!(report.error.unwrap().kind, ErrorKind::Timeout);
    assert!(report.elapsed_ms < 5_000, "engine must not sleep the full delay");
}

#[tokio::test]
async fn delay_passes_its_input_through() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "n", "data": {"value": 3}},
                {"id": "wait", "type": "delay", "data": {"duration": "10ms"}}
            ],
            "edges": [{"source": "n", "target": "wait"}]
        })))
        .await;

    assert!(report.success);
    assert_eq!(report.node_results["wait"]["value"], json!(3));
    assert_eq!(report.node_results["wait"]["delayed"], json!(true));
}

#[tokio::test]
async fn multiple_terminals_report_as_a_mapping() {
    let engine = Engine::new().unwrap();
    let report = engine
        .run(
            WorkflowBuilder::new()
                .number("src", 4.0)
                .number("other", 9.0)
                .build(),
        )
        .await;

    assert!(report.success);
    assert_eq!(report.final_output, json!({"other": 9, "src": 4}));
}

#[tokio::test]
async fn lifecycle_events_arrive_in_order() {
    let (observer, stream) = ChannelObserver::channel(64);
    let engine = Engine::builder().observer(observer).build().unwrap();

    let report = engine
        .run(
            WorkflowBuilder::new()
                .number("a", 10.0)
                .number("b", 5.0)
                .operation("sum", MathOp::Add)
                .edge("a", "sum")
                .edge("b", "sum")
                .build(),
        )
        .await;
    assert!(report.success);
    drop(engine);

    let events: Vec<_> = stream.collect().await;
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::WorkflowStarted,
            EventKind::NodeStarted,
            EventKind::NodeSucceeded,
            EventKind::NodeStarted,
            EventKind::NodeSucceeded,
            EventKind::NodeStarted,
            EventKind::NodeSucceeded,
            EventKind::WorkflowSucceeded,
        ]
    );
    // node order follows the topological order
    let started: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::NodeStarted)
        .filter_map(|e| e.node_id.clone())
        .collect();
    assert_eq!(started, vec!["a", "b", "sum"]);
    // every event belongs to the same execution
    let first_id = &events[0].execution_id;
    assert!(events.iter().all(|e| &e.execution_id == first_id));
}

#[tokio::test]
async fn failed_workflow_emits_node_and_workflow_failures() {
    let (observer, stream) = ChannelObserver::channel(64);
    let engine = Engine::builder().observer(observer).build().unwrap();

    let report = engine
        .run(
            WorkflowBuilder::new()
                .number("a", 1.0)
                .number("z", 0.0)
                .operation("div", MathOp::Divide)
                .edge("a", "div")
                .edge("z", "div")
                .build(),
        )
        .await;
    assert!(!report.success);
    drop(engine);

    let events: Vec<seam_node::event::Event> = stream.collect().await;
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::NodeFailed));
    assert_eq!(*kinds.last().unwrap(), EventKind::WorkflowFailed);
}

#[tokio::test]
async fn custom_executors_register_and_dispatch() {
    use async_trait::async_trait;
    use seam_node::context::{ContextExt, ExecutionContext};
    use seam_node::error::Result;
    use seam_node::executor::NodeExecutor;
    use seam_node::node::ValidatedNode;
    use std::sync::Arc;

    struct DoubleExecutor;

    #[async_trait]
    impl NodeExecutor for DoubleExecutor {
        fn kind(&self) -> NodeKind {
            NodeKind::Custom("double".into())
        }

        async fn execute(
            &self,
            ctx: &dyn ExecutionContext,
            _node: &ValidatedNode,
        ) -> Result<Value> {
            let input = ctx.sole_input()?;
            let n = input.value.as_f64().unwrap_or(0.0);
            Ok(json!(n * 2.0))
        }
    }

    let engine = Engine::builder()
        .executor(Arc::new(DoubleExecutor))
        .build()
        .unwrap();
    let report = engine
        .run(payload(json!({
            "nodes": [
                {"id": "n", "data": {"value": 21}},
                {"id": "d", "type": "double", "data": {}}
            ],
            "edges": [{"source": "n", "target": "d"}]
        })))
        .await;

    assert!(report.success, "unexpected error: {:?}", report.error);
    assert_eq!(report.node_results["d"], json!(42.0));
    assert_eq!(report.final_output, json!(42.0));
}

#[tokio::test]
async fn same_payload_produces_identical_results() {
    let engine = Engine::new().unwrap();
    let build = || {
        payload(json!({
            "nodes": [
                {"id": "a", "data": {"value": 2}},
                {"id": "b", "data": {"value": 3}},
                {"id": "mul", "type": "operation", "data": {"op": "multiply"}},
                {"id": "cond", "type": "condition", "data": {"condition": "node.mul.value == 6"}}
            ],
            "edges": [
                {"source": "a", "target": "mul"},
                {"source": "b", "target": "mul"}
            ]
        }))
    };
    let first = engine.run(build()).await;
    let second = engine.run(build()).await;
    assert_eq!(first.node_results, second.node_results);
    assert_eq!(first.final_output, second.final_output);
}
