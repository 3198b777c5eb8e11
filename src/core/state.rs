//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every step exited with code 0
    Completed,
    /// A step (or a service) failed
    Failed,
    /// The trigger event did not match the pipeline's `on:` section
    Skipped,
    /// The run was interrupted
    Cancelled,
}

impl ExecutionStatus {
    /// Parse the `Debug` representation stored by the history backends
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Pending" => Some(ExecutionStatus::Pending),
            "Running" => Some(ExecutionStatus::Running),
            "Completed" => Some(ExecutionStatus::Completed),
            "Failed" => Some(ExecutionStatus::Failed),
            "Skipped" => Some(ExecutionStatus::Skipped),
            "Cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not run yet
    Pending,
    /// Step is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Step exited with code 0
    Completed {
        exit_code: i32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step exited non-zero (or could not be run at all)
    Failed {
        exit_code: i32,
        error: String,
        /// Last lines of the step's combined stdout/stderr
        output_tail: Vec<String>,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step never ran
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }

    /// Whether the step's command was actually invoked
    pub fn was_invoked(&self) -> bool {
        matches!(
            self,
            StepState::Running { .. } | StepState::Completed { .. } | StepState::Failed { .. }
        )
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps
    pub total_steps: usize,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Display name of the step that failed the run
    pub failed_step: Option<String>,

    /// Exit status of the run
    pub exit_code: i32,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_steps: 0,
            completed_steps: 0,
            failed_step: None,
            exit_code: 0,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.exit_code = 0;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as failed by `step` with the given exit code
    pub fn fail(&mut self, step: Option<String>, exit_code: i32) {
        self.status = ExecutionStatus::Failed;
        self.failed_step = step;
        self.exit_code = exit_code;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as skipped (trigger did not match)
    pub fn skip(&mut self, total_steps: usize) {
        let now = Utc::now();
        self.status = ExecutionStatus::Skipped;
        self.total_steps = total_steps;
        self.exit_code = 0;
        self.started_at = Some(now);
        self.completed_at = Some(now);
    }

    /// Mark pipeline as cancelled
    pub fn cancel(&mut self, exit_code: i32) {
        self.status = ExecutionStatus::Cancelled;
        self.exit_code = exit_code;
        self.completed_at = Some(Utc::now());
    }

    /// Calculate progress percentage (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps as f64 / self.total_steps as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
