// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::sync::Arc;

use tempfile::tempdir;

use jobgraph::config::{load_and_validate, load_from_path};
use jobgraph::{JobGraphError, Leader, LogLevel, QueryStatus};
use jobgraph_test_utils::builders::JobBuilder;
use jobgraph_test_utils::fake_expert::{FakeExpertFactory, ScriptedExpert};
use jobgraph_test_utils::fake_planner::StaticPlanner;
use jobgraph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const FULL_CONFIG: &str = r#"
[logging]
level = "debug"

[scheduler]
stall_poll_interval_ms = 10
max_stall_polls = 5
max_backtracks_per_edge = 2
node_timeout_secs = 30

[decomposer]
retries = 3

[expert.writer]
description = "Writes prose from bullet points"
reasoner = "large-model"
workflow = "workflows/writer.yml"

[expert.reviewer]
id = "rev-1"
description = "Reviews drafts"
"#;

#[test]
fn full_config_loads_from_disk() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("JobGraph.toml");
    fs::write(&path, FULL_CONFIG)?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.logging.level, Some(LogLevel::Debug));
    assert_eq!(cfg.scheduler.stall_poll_interval_ms, 10);
    assert_eq!(cfg.scheduler.max_stall_polls, 5);
    assert_eq!(cfg.scheduler.max_backtracks_per_edge, Some(2));
    assert_eq!(cfg.scheduler.node_timeout_secs, Some(30));
    assert_eq!(cfg.decomposer.retries, 3);

    let experts = cfg.expert_configs();
    assert_eq!(experts.len(), 2);
    // Name order: reviewer before writer.
    assert_eq!(experts[0].name, "reviewer");
    assert_eq!(experts[0].id, "rev-1");
    assert_eq!(experts[1].id, "expert-writer");
    assert_eq!(experts[1].workflow, "workflows/writer.yml");
    Ok(())
}

#[test]
fn config_without_experts_is_rejected() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("JobGraph.toml");
    fs::write(&path, "[scheduler]\nmax_stall_polls = 3\n")?;

    // Parses fine; validation is what fails.
    let raw = load_from_path(&path)?;
    assert!(raw.expert.is_empty());

    let err = load_and_validate(&path).expect_err("no experts");
    assert!(matches!(err, JobGraphError::ConfigError(_)));
    Ok(())
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("JobGraph.toml");
    fs::write(&path, "[expert.writer\ndescription = ")?;

    let err = load_and_validate(&path).expect_err("broken toml");
    assert!(matches!(err, JobGraphError::TomlError(_)));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = tempdir()?;
    let err = load_and_validate(dir.path().join("absent.toml")).expect_err("no file");
    assert!(matches!(err, JobGraphError::IoError(_)));
    Ok(())
}

#[tokio::test]
async fn leader_from_config_runs_a_pre_assigned_job() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("JobGraph.toml");
    fs::write(&path, FULL_CONFIG)?;
    let cfg = load_and_validate(&path)?;

    let factory = Arc::new(FakeExpertFactory::new().with_expert(ScriptedExpert::new("rev-1")));
    let planner = Arc::new(StaticPlanner::failing("planner unused"));
    let leader = Leader::from_config(&cfg, planner, factory.clone())?;

    assert_eq!(leader.registry().expert_configs().len(), 2);

    let job = JobBuilder::new("review-job")
        .goal("Review chapter one")
        .assigned_expert("reviewer")
        .build();
    let result = with_timeout(leader.execute_original_job(&job)).await?;

    assert_eq!(result.status, QueryStatus::Finished);
    assert_eq!(result.result, "Review chapter one\n");
    let reviewer = factory.expert("rev-1").expect("reviewer built");
    assert_eq!(reviewer.calls().len(), 1);
    Ok(())
}
