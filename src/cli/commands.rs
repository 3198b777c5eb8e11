//! CLI command definitions

use crate::core::TriggerEvent;
use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Event the run is started for
    #[arg(long, value_enum, default_value_t = EventArg::Manual)]
    pub event: EventArg,

    /// Branch that was pushed (with `--event push`)
    #[arg(long)]
    pub branch: Option<String>,

    /// Base branch of the pull request (with `--event pull-request`)
    #[arg(long)]
    pub base: Option<String>,

    /// Don't start service containers (assume they are already running)
    #[arg(long)]
    pub no_services: bool,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,

    /// Switch toolchains without installing them through rustup
    #[arg(long)]
    pub no_toolchain_install: bool,

    /// Directory commands run in (defaults to the current directory)
    #[arg(short = 'C', long)]
    pub working_dir: Option<String>,

    /// Environment overrides for every command (KEY=VALUE)
    #[arg(long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,
}

impl RunCommand {
    /// Build the trigger event from the arguments
    pub fn trigger(&self) -> Result<TriggerEvent, String> {
        match self.event {
            EventArg::Manual => Ok(TriggerEvent::Manual),
            EventArg::Push => self
                .branch
                .clone()
                .map(|branch| TriggerEvent::Push { branch })
                .ok_or_else(|| "--event push requires --branch".to_string()),
            EventArg::PullRequest => Ok(TriggerEvent::PullRequest {
                base: self.base.clone(),
            }),
        }
    }
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single execution
    #[arg(long)]
    pub execution_id: Option<String>,

    /// List the names of pipelines with recorded runs
    #[arg(long, conflicts_with_all = ["pipeline", "execution_id"])]
    pub pipelines: bool,
}

/// Trigger event argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventArg {
    Push,
    #[clap(name = "pull-request")]
    PullRequest,
    Manual,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
