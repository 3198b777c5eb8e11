//! Step executor - runs individual steps through a command runner

use crate::{
    core::{Step, StepAction, ToolchainState},
    process::{CommandRunner, Invocation, OutputCallback, ProcessError},
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

/// Result of executing a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Step exited with code 0
    Success,
    /// Step exited non-zero or could not be run
    Failed {
        exit_code: i32,
        error: String,
        output_tail: Vec<String>,
    },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success)
    }
}

/// Everything a step needs from the run it belongs to
#[derive(Debug, Clone)]
pub struct StepContext<'a> {
    /// Shell used for `run` commands
    pub shell: &'a str,
    /// Pipeline-level environment
    pub env: &'a BTreeMap<String, String>,
    /// The toolchain active when the step starts
    pub toolchain: &'a ToolchainState,
    /// Base working directory of the run
    pub working_dir: Option<&'a Path>,
}

/// Executes a single step
pub struct StepExecutor<R> {
    runner: R,
    install_toolchains: bool,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            install_toolchains: true,
        }
    }

    /// When false, toolchain steps only switch the active toolchain
    pub fn with_toolchain_install(mut self, install: bool) -> Self {
        self.install_toolchains = install;
        self
    }

    /// Build the invocation for a step, or `None` when nothing has to run
    pub fn invocation_for(&self, step: &Step, context: &StepContext<'_>) -> Option<Invocation> {
        let mut invocation = match &step.action {
            StepAction::Run { command } => Invocation::shell(context.shell, command),
            StepAction::Toolchain(selection) => {
                if !self.install_toolchains {
                    return None;
                }
                let (program, args) = selection.install_command();
                Invocation::new(program, args)
            }
        };

        // Pipeline env, then the active toolchain, then step env
        invocation
            .env
            .extend(context.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        invocation.env.extend(context.toolchain.env());
        invocation
            .env
            .extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        invocation.working_dir = resolve_working_dir(context.working_dir, step.working_directory.as_deref());
        invocation.timeout = Some(Duration::from_secs(step.timeout_secs));

        Some(invocation)
    }

    /// Execute a step and return the result
    pub async fn execute(
        &self,
        step: &Step,
        context: &StepContext<'_>,
        callback: Option<&dyn OutputCallback>,
    ) -> ExecutionResult {
        info!("Executing step: {}", step.name);

        let Some(invocation) = self.invocation_for(step, context) else {
            debug!("Step {} has nothing to run", step.name);
            return ExecutionResult::Success;
        };
        debug!("Command for step {}: {}", step.name, invocation.command_line());

        match self.runner.run(&invocation, callback).await {
            Ok(output) if output.success() => {
                info!("Step {} succeeded", step.name);
                ExecutionResult::Success
            }
            Ok(output) => {
                let exit_code = output.code();
                error!("Step {} exited with code {}", step.name, exit_code);
                let error = match output.exit_code {
                    Some(code) => format!("exited with code {}", code),
                    None => "terminated by signal".to_string(),
                };
                ExecutionResult::Failed {
                    exit_code,
                    error,
                    output_tail: output.tail,
                }
            }
            Err(e) => {
                error!("Step {} could not run: {}", step.name, e);
                ExecutionResult::Failed {
                    exit_code: e.exit_code(),
                    error: describe_error(&e),
                    output_tail: Vec::new(),
                }
            }
        }
    }
}

fn describe_error(error: &ProcessError) -> String {
    match error {
        ProcessError::Timeout(secs) => format!("timed out after {} seconds", secs),
        other => other.to_string(),
    }
}

fn resolve_working_dir(base: Option<&Path>, step_dir: Option<&str>) -> Option<PathBuf> {
    match (base, step_dir) {
        (Some(base), Some(dir)) => Some(base.join(dir)),
        (None, Some(dir)) => Some(PathBuf::from(dir)),
        (Some(base), None) => Some(base.to_path_buf()),
        (None, None) => None,
    }
}
