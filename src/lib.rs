//! ci-runner - run a YAML CI pipeline locally
//!
//! Steps run in declared order and the first non-zero exit ends the run.
//! Toolchain steps switch the Rust toolchain for the steps after them, and
//! service containers are started before the first step.

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod process;
pub mod service;

// Re-export commonly used types
pub use core::{ExecutionStatus, Pipeline, Step, StepState, ToolchainSelection, TriggerEvent};
pub use execution::{ExecutionEngine, ExecutionEvent, RunOutcome};
pub use process::{CommandRunner, Invocation, ShellRunner};
pub use service::{ServiceSpec, ServiceSupervisor};
