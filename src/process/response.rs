//! Command results and process errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit code reported when a command runs past its timeout
pub const EXIT_TIMEOUT: i32 = 124;

/// Exit code reported when a command could not be started
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit code reported for a run interrupted with ctrl-c
pub const EXIT_INTERRUPTED: i32 = 130;

/// Error types for running external commands
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running command: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),
}

impl ProcessError {
    /// Exit code a failed step reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessError::Spawn { .. } => EXIT_NOT_FOUND,
            ProcessError::Io(_) => 1,
            ProcessError::Timeout(_) => EXIT_TIMEOUT,
        }
    }
}

/// Result of a command that ran to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,

    /// Last lines of combined stdout/stderr
    pub tail: Vec<String>,
}

impl CommandOutput {
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            tail: Vec::new(),
        }
    }

    pub fn with_tail(mut self, tail: Vec<String>) -> Self {
        self.tail = tail;
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Exit code to report; signal deaths report 1
    pub fn code(&self) -> i32 {
        self.exit_code.unwrap_or(1)
    }
}
