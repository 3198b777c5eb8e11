//! Running external commands

pub mod response;
pub mod shell;
pub mod streaming;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

pub use response::{CommandOutput, ProcessError, EXIT_INTERRUPTED, EXIT_NOT_FOUND, EXIT_TIMEOUT};
pub use shell::ShellRunner;
pub use streaming::{OutputCallback, OutputLine, OutputStream, OutputTail, DEFAULT_TAIL_LINES};

/// A fully resolved command: program, arguments, environment and limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// `<shell> -c <script>`
    pub fn shell(shell: &str, script: &str) -> Self {
        Self::new(shell, ["-c", script])
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value of an environment entry; later entries win
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The command line as a single string, for logs and display
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion, streaming output to `callback`
    ///
    /// A non-zero exit is not an error: it is reported in [`CommandOutput`].
    /// Errors mean the command could not be run or did not finish in time.
    async fn run(
        &self,
        invocation: &Invocation,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<CommandOutput, ProcessError>;
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<R> {
    async fn run(
        &self,
        invocation: &Invocation,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<CommandOutput, ProcessError> {
        (**self).run(invocation, callback).await
    }
}
