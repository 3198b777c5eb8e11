//! Test: Triggers - the `on:` section decides whether a run happens

use crate::helpers::*;
use ci_runner::core::{ExecutionStatus, TriggerEvent};
use ci_runner::execution::ExecutionEvent;

fn push(branch: &str) -> TriggerEvent {
    TriggerEvent::Push {
        branch: branch.to_string(),
    }
}

/// Push to the configured branch and any pull request run the pipeline
#[tokio::test]
async fn test_matching_events_run_all_steps() {
    for event in [
        push("master"),
        TriggerEvent::PullRequest { base: None },
        TriggerEvent::PullRequest {
            base: Some("release/1.0".to_string()),
        },
        TriggerEvent::Manual,
    ] {
        let runner = MockRunner::new();
        let journal = Journal::default();
        let result = run_pipeline(
            CI_PIPELINE,
            event.clone(),
            runner.clone().with_journal(journal.clone()),
            MockSupervisor::new(journal),
        )
        .await;

        assert!(result.is_success(), "{} should run the pipeline", event);
        assert_eq!(runner.commands().len(), 7, "{}", event);
    }
}

/// A push to another branch is skipped: exit 0, no service, no step
#[tokio::test]
async fn test_push_to_other_branch_is_skipped() {
    let runner = MockRunner::new();
    let journal = Journal::default();
    let result = run_pipeline(
        CI_PIPELINE,
        push("feature/login"),
        runner.clone().with_journal(journal.clone()),
        MockSupervisor::new(journal.clone()),
    )
    .await;

    assert_eq!(result.outcome.status, ExecutionStatus::Skipped);
    assert_eq!(result.outcome.exit_code, 0);
    assert!(runner.calls().is_empty());
    assert!(journal.entries().is_empty(), "no service should start: {:?}", journal.entries());
    assert!(result
        .events
        .iter()
        .any(|event| matches!(event, ExecutionEvent::PipelineSkipped { .. })));
    for step in &result.pipeline.steps {
        assert_step_skipped(&result, &step.name);
    }
}

/// Branch globs select which pushes run
#[tokio::test]
async fn test_branch_patterns() {
    let yaml = r#"
name: "Release"
on:
  push:
    branches: ["release/*", "hotfix/**"]
steps:
  - name: "Build"
    run: cargo build --release
"#;
    let cases = [
        ("release/1.2", true),
        ("release/1.2/rc", false),
        ("hotfix/a/b", true),
        ("master", false),
    ];

    for (branch, runs) in cases {
        let runner = MockRunner::new();
        let result = run_pipeline(yaml, push(branch), runner.clone(), MockSupervisor::default()).await;
        assert_eq!(!runner.calls().is_empty(), runs, "branch {}", branch);
        let expected = if runs { ExecutionStatus::Completed } else { ExecutionStatus::Skipped };
        assert_eq!(result.outcome.status, expected, "branch {}", branch);
    }
}

/// Without a `pull_request` trigger, pull requests don't run the pipeline
#[tokio::test]
async fn test_pull_request_not_declared() {
    let yaml = r#"
name: "Push only"
on:
  push:
    branches: [main]
steps:
  - name: "Build"
    run: cargo build
"#;
    let runner = MockRunner::new();
    let result = run_pipeline(
        yaml,
        TriggerEvent::PullRequest {
            base: Some("main".to_string()),
        },
        runner.clone(),
        MockSupervisor::default(),
    )
    .await;

    assert_eq!(result.outcome.status, ExecutionStatus::Skipped);
    assert!(runner.calls().is_empty());
}

/// `pull_request:` with no value still declares the event
#[tokio::test]
async fn test_bare_pull_request_key_runs_on_pull_requests() {
    let yaml = r#"
name: Bare trigger
on:
  push:
    branches: [master]
  pull_request:
steps:
  - name: Build
    run: cargo build
"#;
    let runner = MockRunner::new();
    let result = run_pipeline(
        yaml,
        TriggerEvent::PullRequest { base: None },
        runner.clone(),
        MockSupervisor::default(),
    )
    .await;

    assert!(result.is_success(), "{:?}", result.outcome);
    assert_eq!(runner.commands(), vec!["cargo build"]);
}
