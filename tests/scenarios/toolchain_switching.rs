//! Test: Toolchain Switching - a selection applies to every later step

use crate::helpers::*;
use ci_runner::core::TriggerEvent;

fn toolchain_for<'a>(toolchains: &'a [(String, Option<String>)], command: &str) -> Option<&'a str> {
    toolchains
        .iter()
        .find(|(script, _)| script.starts_with(command))
        .and_then(|(_, toolchain)| toolchain.as_deref())
}

/// Format runs on nightly; everything after the switch runs on the release
#[tokio::test]
async fn test_ci_pipeline_toolchains() {
    let runner = MockRunner::new();
    let result = run_ci(runner.clone(), Journal::default()).await;

    let toolchains = runner.toolchains();
    assert_eq!(toolchain_for(&toolchains, "cargo fmt"), Some("nightly"));
    for command in ["cargo install", "cargo clippy", "cargo hack", "cargo test"] {
        assert_eq!(toolchain_for(&toolchains, command), Some("1.54.0"), "{}", command);
    }

    assert_eq!(result.toolchain_activations(), vec!["nightly", "1.54.0"]);
}

/// Steps before any selection run without a toolchain override
#[tokio::test]
async fn test_no_toolchain_before_first_selection() {
    let yaml = r#"
name: "Late selection"
steps:
  - name: "Version"
    run: rustc --version
  - name: "Select beta"
    toolchain:
      channel: beta
      override: true
  - name: "Build"
    run: cargo build
"#;
    let runner = MockRunner::new();
    run_pipeline(yaml, TriggerEvent::Manual, runner.clone(), MockSupervisor::default()).await;

    let toolchains = runner.toolchains();
    assert_eq!(toolchain_for(&toolchains, "rustc --version"), None);
    assert_eq!(toolchain_for(&toolchains, "cargo build"), Some("beta"));
}

/// A selection without `override` installs the toolchain but keeps the active one
#[tokio::test]
async fn test_non_override_selection_keeps_active_toolchain() {
    let yaml = r#"
name: "Install only"
steps:
  - name: "Stable"
    toolchain:
      channel: stable
      override: true
  - name: "Also install nightly"
    toolchain:
      channel: nightly
      components: [miri]
  - name: "Test"
    run: cargo test
"#;
    let runner = MockRunner::new();
    let result = run_pipeline(yaml, TriggerEvent::Manual, runner.clone(), MockSupervisor::default()).await;

    assert!(result.is_success());
    assert!(runner
        .commands()
        .contains(&"rustup toolchain install nightly --profile minimal --component miri".to_string()));
    assert_eq!(toolchain_for(&runner.toolchains(), "cargo test"), Some("stable"));
    assert_eq!(result.toolchain_activations(), vec!["stable"]);
}

/// A step's own RUSTUP_TOOLCHAIN overrides the active toolchain
#[tokio::test]
async fn test_step_env_overrides_active_toolchain() {
    let yaml = r#"
name: "Pinned step"
steps:
  - name: "Stable"
    toolchain:
      channel: stable
      override: true
  - name: "Miri"
    run: cargo miri test
    env:
      RUSTUP_TOOLCHAIN: nightly
"#;
    let runner = MockRunner::new();
    run_pipeline(yaml, TriggerEvent::Manual, runner.clone(), MockSupervisor::default()).await;

    assert_eq!(toolchain_for(&runner.toolchains(), "cargo miri"), Some("nightly"));
}
