// tests/registry_concurrency.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::task::JoinSet;

use jobgraph::exec::{BoxFuture, Expert, ExpertConfig, ExpertFactory};
use jobgraph::{JobGraphError, Registry};
use jobgraph_test_utils::builders::{ExpertConfigBuilder, registry_with_experts};
use jobgraph_test_utils::fake_expert::FakeExpertFactory;
use jobgraph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lookups_build_one_instance() -> TestResult {
    init_tracing();
    let factory = Arc::new(FakeExpertFactory::new().with_build_delay(Duration::from_millis(50)));
    let registry = registry_with_experts(factory.clone(), &["worker"]);

    let mut lookups = JoinSet::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        lookups.spawn(async move { registry.get_or_create_expert_by_id("expert-worker").await });
    }

    let mut experts: Vec<Arc<dyn Expert>> = Vec::new();
    while let Some(joined) = with_timeout(lookups.join_next()).await {
        experts.push(joined??);
    }

    assert_eq!(experts.len(), 8);
    assert_eq!(factory.constructions(), 1);
    assert!(experts.iter().all(|e| Arc::ptr_eq(e, &experts[0])));
    assert_eq!(registry.expert_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_construction_does_not_block_other_experts() -> TestResult {
    init_tracing();
    let factory = Arc::new(
        FakeExpertFactory::new().with_build_delay_for("expert-worker", Duration::from_secs(30)),
    );
    let registry = registry_with_experts(factory.clone(), &["worker", "critic"]);
    let critic = registry.get_or_create_expert_by_id("expert-critic").await?;

    let slow = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.get_or_create_expert_by_id("expert-worker").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Cached and uncached lookups for other ids both go through.
    let again = tokio::time::timeout(
        Duration::from_secs(1),
        registry.get_or_create_expert_by_name("critic"),
    )
    .await??;
    assert!(Arc::ptr_eq(&critic, &again));
    registry.add_expert_config("writer", ExpertConfigBuilder::new("writer").build())?;
    tokio::time::timeout(
        Duration::from_secs(1),
        registry.get_or_create_expert_by_id("expert-writer"),
    )
    .await??;

    // Abandoning the slow construction leaves the worker uncached.
    slow.abort();
    assert!(slow.await.is_err_and(|e| e.is_cancelled()));
    assert_eq!(registry.expert_count(), 2);
    assert_eq!(factory.constructions(), 3);
    Ok(())
}

#[tokio::test]
async fn lookup_by_name_and_id_share_the_cache() -> TestResult {
    init_tracing();
    let factory = Arc::new(FakeExpertFactory::new());
    let registry = registry_with_experts(factory.clone(), &["worker", "critic"]);

    let by_name = registry.get_or_create_expert_by_name("worker").await?;
    let by_id = registry.get_or_create_expert_by_id("expert-worker").await?;

    assert!(Arc::ptr_eq(&by_name, &by_id));
    assert_eq!(by_name.id(), "expert-worker");
    assert_eq!(factory.constructions(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_experts_are_not_found() -> TestResult {
    init_tracing();
    let registry = registry_with_experts(Arc::new(FakeExpertFactory::new()), &["worker"]);

    let by_name = registry.get_or_create_expert_by_name("nobody").await;
    assert!(matches!(by_name, Err(JobGraphError::NotFound(_))));

    let by_id = registry.get_or_create_expert_by_id("expert-nobody").await;
    assert!(matches!(by_id, Err(JobGraphError::NotFound(_))));

    registry.remove_expert_config("worker");
    let removed = registry.get_or_create_expert_by_name("worker").await;
    assert!(matches!(removed, Err(JobGraphError::NotFound(_))));
    Ok(())
}

#[test]
fn duplicate_expert_name_is_rejected() {
    init_tracing();
    let registry = registry_with_experts(Arc::new(FakeExpertFactory::new()), &["worker"]);

    let err = registry
        .add_expert_config("worker", ExpertConfigBuilder::new("worker").id("expert-other").build())
        .expect_err("name already taken");
    assert!(matches!(err, JobGraphError::DuplicateConfig(ref name) if name == "worker"));

    let kept = registry.get_expert_config("worker").expect("original kept");
    assert_eq!(kept.id, "expert-worker");
}

#[test]
fn job_graphs_are_created_once_per_id() {
    let registry = Registry::new(Arc::new(FakeExpertFactory::new()));

    assert!(registry.job_graph("g").is_none());
    let first = registry.get_or_create_job_graph("g");
    let second = registry.get_or_create_job_graph("g");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(registry.job_graph("g").is_some());
}

struct BrokenFactory;

impl ExpertFactory for BrokenFactory {
    fn create<'a>(&'a self, _config: &'a ExpertConfig) -> BoxFuture<'a, anyhow::Result<Arc<dyn Expert>>> {
        Box::pin(async { Err::<Arc<dyn Expert>, _>(anyhow!("workflow file missing")) })
    }
}

#[tokio::test]
async fn factory_failure_is_reported_and_not_cached() -> TestResult {
    init_tracing();
    let registry = registry_with_experts(Arc::new(BrokenFactory), &["worker"]);

    let err = match registry.get_or_create_expert_by_name("worker").await {
        Ok(_) => panic!("factory cannot build experts"),
        Err(err) => err,
    };
    let text = format!("{err:#}");
    assert!(text.contains("expert-worker"), "{text}");
    assert!(text.contains("workflow file missing"), "{text}");
    assert_eq!(registry.expert_count(), 0);
    Ok(())
}
