//! Step domain model

use crate::core::{config::StepConfig, state::StepState, toolchain::ToolchainSelection};
use std::collections::BTreeMap;

/// What a step does when it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Run one shell command under the active toolchain
    Run { command: String },
    /// Install a toolchain and possibly make it the active one
    Toolchain(ToolchainSelection),
}

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Position in the pipeline (0-based)
    pub index: usize,

    /// Human-readable label, unique within the pipeline
    pub name: String,

    pub action: StepAction,

    /// Extra environment for this step only
    pub env: BTreeMap<String, String>,

    /// Directory the command runs in (relative to the pipeline's working directory)
    pub working_directory: Option<String>,

    /// Timeout in seconds
    pub timeout_secs: u64,

    /// Runtime state (not serialized)
    pub state: StepState,
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(index: usize, config: &StepConfig, defaults: &StepDefaults) -> Self {
        // Validation guarantees exactly one of run/toolchain is set
        let action = match (&config.run, &config.toolchain) {
            (_, Some(selection)) => StepAction::Toolchain(selection.clone()),
            (Some(command), None) => StepAction::Run {
                command: command.trim().to_string(),
            },
            (None, None) => StepAction::Run {
                command: String::new(),
            },
        };

        Step {
            index,
            name: config.name.clone(),
            action,
            env: config.env.clone(),
            working_directory: config.working_directory.clone(),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            state: StepState::Pending,
        }
    }

    /// One-line description of what the step runs, for display
    pub fn describe(&self) -> String {
        match &self.action {
            StepAction::Run { command } => command.clone(),
            StepAction::Toolchain(selection) => {
                let mut text = format!("toolchain {}", selection.channel);
                if !selection.components.is_empty() {
                    text.push_str(&format!(" ({})", selection.components.join(", ")));
                }
                if selection.override_active {
                    text.push_str(" [override]");
                }
                text
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 3600, // 1 hour
        }
    }
}
