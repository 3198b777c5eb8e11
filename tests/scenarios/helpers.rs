//! Test utilities for ci-runner scenarios

use async_trait::async_trait;
use ci_runner::core::config::PipelineConfig;
use ci_runner::core::{ExecutionStatus, Pipeline, StepState, TriggerEvent, TOOLCHAIN_ENV};
use ci_runner::execution::{ExecutionEngine, ExecutionEvent, RunOutcome};
use ci_runner::process::{CommandOutput, CommandRunner, Invocation, OutputCallback, OutputLine, ProcessError};
use ci_runner::service::{ServiceError, ServiceHandle, ServiceSpec, ServiceSupervisor};
use std::sync::{Arc, Mutex};

/// The pipeline shipped with the repository
pub const CI_PIPELINE: &str = include_str!("../../pipelines/ci.yml");

/// Shared, ordered record of everything the mocks were asked to do
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Mock runner: every command exits 0 unless its script contains a
/// configured pattern, in which case it exits with that pattern's code
#[derive(Clone, Default)]
pub struct MockRunner {
    failures: Arc<Vec<(String, i32)>>,
    calls: Arc<Mutex<Vec<Invocation>>>,
    journal: Journal,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Commands containing `pattern` exit with `exit_code`
    pub fn fail_when(mut self, pattern: &str, exit_code: i32) -> Self {
        let mut failures = (*self.failures).clone();
        failures.push((pattern.to_string(), exit_code));
        self.failures = Arc::new(failures);
        self
    }

    /// Every invocation, in order
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// The script of each shell invocation, in order; other programs by command line
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(script_of).collect()
    }

    /// The toolchain each invocation ran under
    pub fn toolchains(&self) -> Vec<(String, Option<String>)> {
        self.calls()
            .iter()
            .map(|call| (script_of(call), call.env_var(TOOLCHAIN_ENV).map(str::to_string)))
            .collect()
    }
}

pub fn script_of(invocation: &Invocation) -> String {
    match invocation.args.as_slice() {
        [flag, script] if flag == "-c" => script.clone(),
        _ => invocation.command_line(),
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<CommandOutput, ProcessError> {
        let script = script_of(invocation);
        self.calls.lock().unwrap().push(invocation.clone());
        self.journal.push(format!("run:{}", script));

        let exit_code = self
            .failures
            .iter()
            .find(|(pattern, _)| script.contains(pattern.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0);

        let line = OutputLine::stdout(format!("mock: {}", script));
        if let Some(cb) = callback {
            cb.on_line(&line);
        }
        Ok(CommandOutput::new(exit_code).with_tail(vec![line.text]))
    }
}

/// Mock supervisor recording `start:`, `ready:` and `stop:` entries
#[derive(Clone, Default)]
pub struct MockSupervisor {
    journal: Journal,
    fail_start: Option<String>,
    never_ready: Option<String>,
}

impl MockSupervisor {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// Starting the named service fails
    pub fn fail_start(mut self, name: &str) -> Self {
        self.fail_start = Some(name.to_string());
        self
    }

    /// The named service starts but never accepts connections
    pub fn never_ready(mut self, name: &str) -> Self {
        self.never_ready = Some(name.to_string());
        self
    }
}

#[async_trait]
impl ServiceSupervisor for MockSupervisor {
    async fn start(&self, spec: &ServiceSpec, run_label: &str) -> Result<ServiceHandle, ServiceError> {
        if self.fail_start.as_deref() == Some(spec.name.as_str()) {
            return Err(ServiceError::Start {
                name: spec.name.clone(),
                reason: "image not found".to_string(),
            });
        }
        self.journal.push(format!("start:{}", spec.name));
        Ok(ServiceHandle {
            name: spec.name.clone(),
            container: format!("{}-{}", run_label, spec.name),
            ports: spec.ports.clone(),
        })
    }

    async fn wait_ready(&self, handle: &ServiceHandle) -> Result<(), ServiceError> {
        if self.never_ready.as_deref() == Some(handle.name.as_str()) {
            return Err(ServiceError::NotReady {
                name: handle.name.clone(),
                port: handle.host_ports().first().copied().unwrap_or(0),
                waited_secs: 30,
            });
        }
        self.journal.push(format!("ready:{}", handle.name));
        Ok(())
    }

    async fn stop(&self, handle: &ServiceHandle) -> Result<(), ServiceError> {
        self.journal.push(format!("stop:{}", handle.name));
        Ok(())
    }
}

/// Result of running a pipeline against the mocks
pub struct TestRun {
    pub pipeline: Pipeline,
    pub outcome: RunOutcome,
    pub events: Vec<ExecutionEvent>,
}

impl TestRun {
    pub fn is_success(&self) -> bool {
        self.outcome.status == ExecutionStatus::Completed && self.outcome.exit_code == 0
    }

    pub fn step_state(&self, name: &str) -> &StepState {
        &self
            .pipeline
            .step(name)
            .unwrap_or_else(|| panic!("Step '{}' not found", name))
            .state
    }

    pub fn toolchain_activations(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExecutionEvent::ToolchainActivated { channel } => Some(channel.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Run `yaml` for `trigger` with the given mocks
pub async fn run_pipeline(
    yaml: &str,
    trigger: TriggerEvent,
    runner: MockRunner,
    supervisor: MockSupervisor,
) -> TestRun {
    let config = PipelineConfig::from_yaml(yaml).expect("pipeline should be valid");
    let mut pipeline = config.to_pipeline();
    let services = config.service_specs().expect("services should be valid");

    let mut engine = ExecutionEngine::new(runner, supervisor).with_services(services);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let outcome = engine.execute(&mut pipeline, &trigger).await;
    let events = events.lock().unwrap().clone();

    TestRun {
        pipeline,
        outcome,
        events,
    }
}

/// Run the shipped CI pipeline for a push to master
pub async fn run_ci(runner: MockRunner, journal: Journal) -> TestRun {
    run_pipeline(
        CI_PIPELINE,
        TriggerEvent::Push {
            branch: "master".to_string(),
        },
        runner.with_journal(journal.clone()),
        MockSupervisor::new(journal),
    )
    .await
}

/// Assert a step ran and exited 0
pub fn assert_step_completed(result: &TestRun, name: &str) {
    let state = result.step_state(name);
    assert!(
        matches!(state, StepState::Completed { exit_code: 0, .. }),
        "Step '{}' should be completed, but was in state: {:?}",
        name,
        state
    );
}

/// Assert a step failed with `exit_code`
pub fn assert_step_failed(result: &TestRun, name: &str, exit_code: i32) {
    match result.step_state(name) {
        StepState::Failed { exit_code: code, .. } => assert_eq!(
            *code, exit_code,
            "Step '{}' failed with {} instead of {}",
            name, code, exit_code
        ),
        other => panic!("Step '{}' should have failed, but was in state: {:?}", name, other),
    }
}

/// Assert a step never ran
pub fn assert_step_skipped(result: &TestRun, name: &str) {
    let state = result.step_state(name);
    assert!(
        matches!(state, StepState::Skipped { .. }),
        "Step '{}' should be skipped, but was in state: {:?}",
        name,
        state
    );
}
