// tests/query_result.rs

use std::error::Error;
use std::sync::Arc;

use jobgraph::engine::query::NOT_COMPLETED_TEXT;
use jobgraph::registry::lock_graph;
use jobgraph::{JobGraphError, QueryStatus, Registry, WorkflowMessage, query_result};
use jobgraph_test_utils::builders::{GraphBuilder, registry_with_experts};
use jobgraph_test_utils::fake_expert::FakeExpertFactory;

type TestResult = Result<(), Box<dyn Error>>;

fn fan_out_registry() -> Arc<Registry> {
    let registry = registry_with_experts(Arc::new(FakeExpertFactory::new()), &["worker"]);
    let graph = GraphBuilder::new("expert-worker")
        .edge("A", "C")
        .edge("A", "B")
        .build();
    registry
        .replace_subgraph("g", &graph, None)
        .expect("graph merges");
    registry
}

fn set(registry: &Registry, id: &str, text: &str) {
    let shared = registry.job_graph("g").expect("graph exists");
    assert!(lock_graph(&shared).set_result(id, WorkflowMessage::success(text)));
}

#[test]
fn running_until_every_sink_has_a_result() -> TestResult {
    let registry = fan_out_registry();

    set(&registry, "A", "a-out");
    set(&registry, "C", "c-out");
    let partial = query_result(&registry, "g")?;
    assert_eq!(partial.status, QueryStatus::Running);
    assert_eq!(partial.result, NOT_COMPLETED_TEXT);

    set(&registry, "B", "b-out");
    let done = query_result(&registry, "g")?;
    assert_eq!(done.job_id, "g");
    assert_eq!(done.status, QueryStatus::Finished);
    // Sinks in id order, each followed by a newline; A is not a sink.
    assert_eq!(done.result, "b-out\nc-out\n");
    Ok(())
}

#[test]
fn serializes_with_uppercase_status() -> TestResult {
    let registry = fan_out_registry();
    let value = serde_json::to_value(query_result(&registry, "g")?)?;
    assert_eq!(value["status"], "RUNNING");
    assert_eq!(value["job_id"], "g");
    Ok(())
}

#[test]
fn unknown_job_is_not_found() {
    let registry = Registry::new(Arc::new(FakeExpertFactory::new()));
    let err = query_result(&registry, "nope").expect_err("never submitted");
    assert!(matches!(err, JobGraphError::NotFound(ref what) if what.contains("nope")));
}

#[test]
fn empty_graph_is_finished() -> TestResult {
    let registry = Registry::new(Arc::new(FakeExpertFactory::new()));
    registry.get_or_create_job_graph("empty");
    let result = query_result(&registry, "empty")?;
    assert_eq!(result.status, QueryStatus::Finished);
    assert!(result.result.is_empty());
    Ok(())
}
