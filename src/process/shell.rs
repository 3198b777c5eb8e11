//! Subprocess runner built on `tokio::process`

use crate::process::{
    CommandOutput, CommandRunner, Invocation, OutputCallback, OutputLine, OutputTail,
    ProcessError,
};
use async_trait::async_trait;
use std::borrow::Cow;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, warn};

/// How long output is still read after the child exits
///
/// A background process started by the command can inherit its stdout and
/// keep the pipe open; the step's result does not wait for it.
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs invocations as real child processes
///
/// stdout and stderr are piped and read line by line; stdin is closed.
/// On unix each child leads its own process group, and the whole group is
/// killed if the run times out or is dropped (cancellation).
#[derive(Debug, Clone)]
pub struct ShellRunner {
    tail_lines: usize,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            tail_lines: crate::process::DEFAULT_TAIL_LINES,
        }
    }

    /// Keep `lines` lines of output for failure reports
    pub fn with_tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines;
        self
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode one raw output line; invalid UTF-8 is replaced, not rejected
fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}

/// Kills the child's process group when dropped, unless disarmed
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    /// The command finished on its own; leave what it started alone
    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => debug!("Killed process group {}", pgid),
                Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
            }
        }

        #[cfg(not(unix))]
        debug!("Process groups are not supported here; {} is killed on drop", pgid);
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<CommandOutput, ProcessError> {
        debug!(
            "Spawning {} with {} args",
            invocation.program,
            invocation.args.len()
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        let mut group = ProcessGroup::of(&child);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;

        let mut tail = OutputTail::new(self.tail_lines);
        let mut record = |line: OutputLine| {
            tail.push(&line.text);
            if let Some(cb) = callback {
                cb.on_line(&line);
            }
        };

        let drive = async {
            let mut out_lines = BufReader::new(stdout).split(b'\n');
            let mut err_lines = BufReader::new(stderr).split(b'\n');
            let mut out_done = false;
            let mut err_done = false;
            let mut status: Option<ExitStatus> = None;
            let mut drain_until = Instant::now();

            // Read both pipes while waiting for the child; once it has
            // exited, keep reading only until the pipes close or the grace runs out
            while !(out_done && err_done) {
                tokio::select! {
                    segment = out_lines.next_segment(), if !out_done => match segment {
                        Ok(Some(raw)) => record(OutputLine::stdout(decode_line(&raw))),
                        Ok(None) => out_done = true,
                        Err(e) => {
                            warn!("Failed to read stdout of {}: {}", invocation.program, e);
                            out_done = true;
                        }
                    },
                    segment = err_lines.next_segment(), if !err_done => match segment {
                        Ok(Some(raw)) => record(OutputLine::stderr(decode_line(&raw))),
                        Ok(None) => err_done = true,
                        Err(e) => {
                            warn!("Failed to read stderr of {}: {}", invocation.program, e);
                            err_done = true;
                        }
                    },
                    exited = child.wait(), if status.is_none() => {
                        status = Some(exited?);
                        drain_until = Instant::now() + OUTPUT_DRAIN_GRACE;
                    },
                    _ = sleep_until(drain_until), if status.is_some() => {
                        debug!(
                            "{} exited but its output is still open, not waiting for it",
                            invocation.program
                        );
                        break;
                    },
                }
            }

            match status {
                Some(status) => Ok(status),
                None => child.wait().await,
            }
        };

        let result = match invocation.timeout {
            Some(limit) => match timeout(limit, drive).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "{} timed out after {}s, killing it",
                        invocation.program,
                        limit.as_secs()
                    );
                    group.kill();
                    return Err(ProcessError::Timeout(limit.as_secs()));
                }
            },
            None => drive.await,
        };
        let status: ExitStatus = result?;
        group.disarm();
        let exit_code = status.code();
        debug!("{} exited with {:?}", invocation.program, exit_code);

        Ok(CommandOutput {
            exit_code,
            tail: tail.into_lines(),
        })
    }
}
