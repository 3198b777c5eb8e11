//! Test: Success Chain - every step runs in declared order

use crate::helpers::*;
use ci_runner::core::{ExecutionStatus, TriggerEvent};

const CI_COMMANDS: &[&str] = &[
    "rustup toolchain install nightly --profile minimal --component rustfmt",
    "cargo fmt --all -- --check",
    "rustup toolchain install 1.54.0 --profile minimal --component clippy",
    "cargo install cargo-hack",
    "cargo clippy --all --all-features",
    "cargo hack check --all --each-feature --no-dev-deps",
    "cargo test --all --all-features --verbose",
];

/// All steps of the shipped pipeline exit 0, so the run succeeds
#[tokio::test]
async fn test_all_steps_succeed() {
    let runner = MockRunner::new();
    let result = run_ci(runner.clone(), Journal::default()).await;

    assert!(result.is_success(), "run should succeed: {:?}", result.outcome);
    assert_eq!(result.outcome.exit_code, 0);
    assert!(result.outcome.failed_step.is_none());
    assert_eq!(result.pipeline.state.completed_steps, CI_COMMANDS.len());

    for step in &result.pipeline.steps {
        assert_step_completed(&result, &step.name);
    }
}

/// Commands are invoked exactly in the declared order
#[tokio::test]
async fn test_commands_run_in_declared_order() {
    let runner = MockRunner::new();
    run_ci(runner.clone(), Journal::default()).await;

    assert_eq!(runner.commands(), CI_COMMANDS);
}

/// `cargo install cargo-hack` runs before the step that uses it
#[tokio::test]
async fn test_tool_install_precedes_its_use() {
    let runner = MockRunner::new();
    run_ci(runner.clone(), Journal::default()).await;

    let commands = runner.commands();
    let install = commands.iter().position(|c| c == "cargo install cargo-hack").unwrap();
    let usage = commands.iter().position(|c| c.starts_with("cargo hack")).unwrap();
    assert!(install < usage);
}

/// Pipeline and step environment reach the command, step values winning
#[tokio::test]
async fn test_environment_layers() {
    let yaml = r#"
name: "Env"
env:
  CARGO_TERM_COLOR: always
  RUSTFLAGS: "-D warnings"
steps:
  - name: "Build"
    run: cargo build
    env:
      RUSTFLAGS: "-C debuginfo=0"
"#;
    let runner = MockRunner::new();
    let result = run_pipeline(yaml, TriggerEvent::Manual, runner.clone(), MockSupervisor::default()).await;

    assert_eq!(result.outcome.status, ExecutionStatus::Completed);
    let call = &runner.calls()[0];
    assert_eq!(call.env_var("CARGO_TERM_COLOR"), Some("always"));
    assert_eq!(call.env_var("RUSTFLAGS"), Some("-C debuginfo=0"));
}

/// Each step's command is run through the configured shell
#[tokio::test]
async fn test_commands_use_configured_shell() {
    let yaml = r#"
name: "Shell"
shell: bash
steps:
  - name: "Build"
    run: cargo build
"#;
    let runner = MockRunner::new();
    run_pipeline(yaml, TriggerEvent::Manual, runner.clone(), MockSupervisor::default()).await;

    let call = &runner.calls()[0];
    assert_eq!(call.program, "bash");
    assert_eq!(call.args, vec!["-c", "cargo build"]);
}
