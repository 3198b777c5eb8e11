//! Test: Failure Handling - the first non-zero exit ends the run

use crate::helpers::*;
use ci_runner::core::{ExecutionStatus, StepState, TriggerEvent};
use ci_runner::execution::{ExecutionEvent, SKIP_AFTER_FAILURE};

/// `cargo fmt` exits 1: the run fails and nothing after it is invoked
#[tokio::test]
async fn test_format_failure_stops_the_run() {
    let runner = MockRunner::new().fail_when("cargo fmt", 1);
    let result = run_ci(runner.clone(), Journal::default()).await;

    assert!(!result.is_success());
    assert_eq!(result.outcome.status, ExecutionStatus::Failed);
    assert_eq!(result.outcome.exit_code, 1);
    assert_eq!(result.outcome.failed_step.as_deref(), Some("Check format"));

    let commands = runner.commands();
    assert_eq!(commands.len(), 2, "only the nightly install and fmt should run: {:?}", commands);
    assert_eq!(commands.last().map(String::as_str), Some("cargo fmt --all -- --check"));

    assert_step_failed(&result, "Check format", 1);
    for name in [
        "Install release toolchain",
        "Install cargo-hack",
        "Check with clippy",
        "Check each feature",
        "Run tests",
    ] {
        assert_step_skipped(&result, name);
    }
}

/// The run's exit code is the failing step's exit code
#[tokio::test]
async fn test_exit_code_is_first_failure() {
    let runner = MockRunner::new()
        .fail_when("cargo clippy", 101)
        .fail_when("cargo test", 3);
    let result = run_ci(runner.clone(), Journal::default()).await;

    assert_eq!(result.outcome.exit_code, 101);
    assert_eq!(result.outcome.failed_step.as_deref(), Some("Check with clippy"));
    assert!(!runner.commands().iter().any(|c| c.starts_with("cargo test")));
}

/// For every position i, a failure at i means no step after i is invoked
#[tokio::test]
async fn test_no_step_after_failure_is_invoked() {
    let yaml = r#"
name: "Chain"
steps:
  - name: "one"
    run: "step-1"
  - name: "two"
    run: "step-2"
  - name: "three"
    run: "step-3"
  - name: "four"
    run: "step-4"
"#;

    for failing in 1..=4 {
        let runner = MockRunner::new().fail_when(&format!("step-{}", failing), 2);
        let result = run_pipeline(yaml, TriggerEvent::Manual, runner.clone(), MockSupervisor::default()).await;

        let expected: Vec<String> = (1..=failing).map(|i| format!("step-{}", i)).collect();
        assert_eq!(runner.commands(), expected, "failure at step {}", failing);
        assert_eq!(result.outcome.exit_code, 2);
        assert_eq!(result.pipeline.invoked_steps().len(), failing);
    }
}

/// Skipped steps record why they never ran
#[tokio::test]
async fn test_skipped_steps_have_reason() {
    let runner = MockRunner::new().fail_when("cargo install", 1);
    let result = run_ci(runner, Journal::default()).await;

    match result.step_state("Run tests") {
        StepState::Skipped { reason } => assert_eq!(reason, SKIP_AFTER_FAILURE),
        other => panic!("unexpected state {:?}", other),
    }

    let skipped: Vec<&str> = result
        .events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::StepSkipped { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec!["Check with clippy", "Check each feature", "Run tests"]);
}

/// The failure event carries the captured output of the failing step
#[tokio::test]
async fn test_failure_reports_output_tail() {
    let runner = MockRunner::new().fail_when("cargo fmt", 1);
    let result = run_ci(runner, Journal::default()).await;

    let tail = result
        .events
        .iter()
        .find_map(|event| match event {
            ExecutionEvent::StepFailed { name, output_tail, .. } if name == "Check format" => {
                Some(output_tail.clone())
            }
            _ => None,
        })
        .expect("StepFailed event for the format step");
    assert_eq!(tail, vec!["mock: cargo fmt --all -- --check"]);
}

/// A failing toolchain install also stops the run
#[tokio::test]
async fn test_toolchain_install_failure_stops_the_run() {
    let runner = MockRunner::new().fail_when("rustup toolchain install 1.54.0", 1);
    let result = run_ci(runner.clone(), Journal::default()).await;

    assert_eq!(result.outcome.failed_step.as_deref(), Some("Install release toolchain"));
    assert_eq!(result.toolchain_activations(), vec!["nightly"]);
    assert_eq!(runner.commands().len(), 3);
}
