//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    state::{ExecutionStatus, PipelineState, StepState},
    step::{Step, StepDefaults},
    trigger::{TriggerConfig, TriggerEvent},
};
use std::collections::BTreeMap;

/// Default shell for `run` commands
pub const DEFAULT_SHELL: &str = "sh";

/// A pipeline definition plus the state of its current run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Events that start a run
    pub triggers: TriggerConfig,

    /// Environment passed to every command
    pub env: BTreeMap<String, String>,

    /// Shell used for `run` commands
    pub shell: String,

    /// Steps in declared order
    pub steps: Vec<Step>,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut defaults = StepDefaults::default();
        if let Some(timeout_secs) = config.default_timeout_secs {
            defaults.timeout_secs = timeout_secs;
        }

        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step_config)| Step::from_config(index, step_config, &defaults))
            .collect();

        Pipeline {
            name: config.name.clone(),
            triggers: config.triggers.clone(),
            env: config.env.clone(),
            shell: config
                .shell
                .clone()
                .unwrap_or_else(|| DEFAULT_SHELL.to_string()),
            steps,
            state: PipelineState::new(),
        }
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Whether the given event should start a run
    pub fn should_run(&self, event: &TriggerEvent) -> bool {
        self.triggers.matches(event)
    }

    /// Check if every step reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state.is_terminal())
    }

    /// Check if pipeline has failed
    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
    }

    /// Names of the steps whose command was invoked, in order
    pub fn invoked_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.state.was_invoked())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Mark every step still pending as skipped
    pub fn skip_pending(&mut self, reason: &str) -> Vec<String> {
        let mut skipped = Vec::new();
        for step in self.steps.iter_mut() {
            if matches!(step.state, StepState::Pending) {
                step.state = StepState::Skipped {
                    reason: reason.to_string(),
                };
                skipped.push(step.name.clone());
            }
        }
        skipped
    }

    /// Reset run state so the pipeline can be executed again
    pub fn reset(&mut self) {
        for step in self.steps.iter_mut() {
            step.state = StepState::Pending;
        }
        self.state = PipelineState::new();
    }
}
