//! Test: Services - started and ready before the first step, stopped after the last

use crate::helpers::*;
use ci_runner::core::config::PipelineConfig;
use ci_runner::core::{ExecutionStatus, TriggerEvent};
use ci_runner::execution::ExecutionEvent;

/// The shipped pipeline declares redis on host port 6379
#[test]
fn test_ci_pipeline_declares_redis() {
    let config = PipelineConfig::from_yaml(CI_PIPELINE).unwrap();
    let services = config.service_specs().unwrap();

    assert_eq!(services.len(), 1);
    let redis = &services[0];
    assert_eq!(redis.name, "redis");
    assert_eq!(redis.image, "redis:5.0.7");
    assert_eq!(redis.ports.iter().map(|p| p.host).collect::<Vec<_>>(), vec![6379]);
    assert_eq!(redis.options, vec!["--entrypoint", "redis-server"]);
}

/// Redis is ready before the first command and stopped after the last
#[tokio::test]
async fn test_service_spans_the_whole_run() {
    let journal = Journal::default();
    let result = run_ci(MockRunner::new(), journal.clone()).await;
    assert!(result.is_success());

    let entries = journal.entries();
    assert_eq!(entries.first().map(String::as_str), Some("start:redis"));
    assert_eq!(entries.get(1).map(String::as_str), Some("ready:redis"));
    assert_eq!(entries.last().map(String::as_str), Some("stop:redis"));
    assert_eq!(entries.iter().filter(|e| e.starts_with("run:")).count(), 7);

    let ready = result
        .events
        .iter()
        .find_map(|event| match event {
            ExecutionEvent::ServiceReady { name, ports } if name == "redis" => Some(ports.clone()),
            _ => None,
        })
        .expect("redis should report ready");
    assert_eq!(ready, vec![6379]);
}

/// Services are torn down even when a step fails
#[tokio::test]
async fn test_service_stopped_after_failure() {
    let journal = Journal::default();
    let runner = MockRunner::new().fail_when("cargo test", 101);
    let result = run_ci(runner, journal.clone()).await;

    assert_eq!(result.outcome.exit_code, 101);
    assert_eq!(journal.entries().last().map(String::as_str), Some("stop:redis"));
}

/// A service that never becomes reachable fails the run before any step
#[tokio::test]
async fn test_unready_service_fails_before_steps() {
    let journal = Journal::default();
    let runner = MockRunner::new().with_journal(journal.clone());
    let result = run_pipeline(
        CI_PIPELINE,
        TriggerEvent::Manual,
        runner.clone(),
        MockSupervisor::new(journal.clone()).never_ready("redis"),
    )
    .await;

    assert_eq!(result.outcome.status, ExecutionStatus::Failed);
    assert_eq!(result.outcome.exit_code, 1);
    assert!(result.outcome.failed_step.is_none());
    assert!(result.outcome.error.as_deref().unwrap_or_default().contains("6379"));
    assert!(runner.calls().is_empty());
    assert_eq!(journal.entries(), vec!["start:redis", "stop:redis"]);
    for step in &result.pipeline.steps {
        assert_step_skipped(&result, &step.name);
    }
}

/// A service that cannot start fails the run; nothing is left to stop
#[tokio::test]
async fn test_service_start_failure() {
    let journal = Journal::default();
    let runner = MockRunner::new().with_journal(journal.clone());
    let result = run_pipeline(
        CI_PIPELINE,
        TriggerEvent::Manual,
        runner.clone(),
        MockSupervisor::new(journal.clone()).fail_start("redis"),
    )
    .await;

    assert_eq!(result.outcome.status, ExecutionStatus::Failed);
    assert!(runner.calls().is_empty());
    assert!(journal.entries().is_empty());
    assert!(result
        .events
        .iter()
        .any(|event| matches!(event, ExecutionEvent::ServiceFailed { name, .. } if name == "redis")));
}

/// Services stop in reverse start order
#[tokio::test]
async fn test_services_stop_in_reverse_order() {
    let yaml = r#"
name: "Two services"
services:
  postgres:
    image: postgres:13
    ports: ["5432:5432"]
  redis:
    image: redis:6
    ports: ["6379"]
steps:
  - name: "Test"
    run: cargo test
"#;
    let journal = Journal::default();
    run_pipeline(
        yaml,
        TriggerEvent::Manual,
        MockRunner::new().with_journal(journal.clone()),
        MockSupervisor::new(journal.clone()),
    )
    .await;

    assert_eq!(
        journal.entries(),
        vec![
            "start:postgres",
            "start:redis",
            "ready:postgres",
            "ready:redis",
            "run:cargo test",
            "stop:redis",
            "stop:postgres",
        ]
    );
}
