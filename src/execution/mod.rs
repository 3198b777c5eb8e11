//! Pipeline execution engine

pub mod engine;
pub mod executor;

pub use engine::{CancelHandle, EventHandler, ExecutionEngine, ExecutionEvent, RunOutcome, SKIP_AFTER_FAILURE};
pub use executor::{ExecutionResult, StepContext, StepExecutor};
