use anyhow::{anyhow, Context, Result};
use ci_runner::cli::commands::{HistoryCommand, RunCommand, ValidateCommand};
use ci_runner::cli::output::*;
use ci_runner::cli::{Cli, Command};
use ci_runner::core::config::PipelineConfig;
use ci_runner::core::{ExecutionStatus, StepAction};
use ci_runner::execution::ExecutionEngine;
use ci_runner::persistence::{create_summary, ExecutionSummary, InMemoryPersistence, PersistenceBackend};
use ci_runner::process::ShellRunner;
use ci_runner::service::{DockerSupervisor, DockerSupervisorConfig};
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = if cli.verbose { "ci_runner=debug" } else { "ci_runner=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to set logging subscriber: {}", e))?;

    // Execute command
    let exit_code = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, cli.quiet).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    let store = ci_runner::persistence::SqliteExecutionStore::with_default_path()
        .await
        .context("Failed to open run history")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    Err(anyhow!("Run history requires the `sqlite` feature"))
}

async fn run_pipeline(cmd: &RunCommand, quiet: bool) -> Result<i32> {
    // Load pipeline config
    let config = PipelineConfig::from_file(&cmd.file)
        .with_context(|| format!("Failed to load pipeline config {}", cmd.file))?;
    let trigger = cmd.trigger().map_err(|e| anyhow!(e))?;

    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let mut pipeline = config.to_pipeline();

    // Apply environment overrides
    for (key, value) in &cmd.env {
        pipeline.env.insert(key.clone(), value.clone());
        println!("{} Env override: {} = {}", INFO, style(key).cyan(), style(value).dim());
    }

    let services = if cmd.no_services {
        if !config.services.is_empty() {
            println!(
                "{} Not starting services: {}",
                WARN,
                config.services.keys().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        Vec::new()
    } else {
        config.service_specs()?
    };

    // History sink; runs with --no-history are kept in memory only
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        history_store().await?
    };

    let supervisor = DockerSupervisor::new(ShellRunner::new(), DockerSupervisorConfig::default());
    let mut engine = ExecutionEngine::new(ShellRunner::new(), supervisor)
        .with_services(services)
        .with_toolchain_install(!cmd.no_toolchain_install);
    if let Some(dir) = &cmd.working_dir {
        engine = engine.with_working_dir(dir);
    }

    let reporter = ConsoleReporter::new(quiet);
    engine.add_event_handler(move |event| reporter.handle(&event));

    // Ctrl-C cancels service startup or the running step; services are still torn down
    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    println!();
    let outcome = engine.execute(&mut pipeline, &trigger).await;

    let summary = create_summary(&pipeline, &trigger);
    match store.save_execution(&summary).await {
        Ok(()) if !cmd.no_history => println!(
            "\n{} Execution saved to history (ID: {})",
            INFO,
            style(&summary.execution_id.simple().to_string()[..8]).dim()
        ),
        Ok(()) => {}
        Err(e) => warn!("Failed to save run history: {:#}", e),
    }

    println!("\n{}", style("Steps:").bold());
    for step in &pipeline.steps {
        println!("  {:<40} {}", step.name, format_step_state(&step.state));
    }

    match outcome.status {
        ExecutionStatus::Completed => println!(
            "\n{} {} completed {}",
            CHECK,
            style(&pipeline.name).bold(),
            style("successfully").green()
        ),
        ExecutionStatus::Skipped => println!(
            "\n{} {} skipped: not triggered by {}",
            SKIP,
            style(&pipeline.name).bold(),
            trigger
        ),
        _ => {
            let failed_at = outcome
                .failed_step
                .as_deref()
                .map(|step| format!(" at step {}", style(step).red()))
                .unwrap_or_default();
            println!(
                "\n{} {} {}{} (exit code {})",
                CROSS,
                style(&pipeline.name).bold(),
                style("failed").red(),
                failed_at,
                outcome.exit_code
            );
            if let Some(message) = &outcome.error {
                error!("{}", message);
            }
        }
    }

    Ok(outcome.exit_code)
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<i32> {
    println!("{} Validating pipeline...", INFO);

    let config = match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            return Ok(1);
        }
    };

    println!("{} Pipeline configuration is valid!", CHECK);
    println!("  Name: {}", style(&config.name).bold());
    println!("  Steps: {}", style(config.steps.len()).cyan());
    println!("  Services: {}", style(config.services.len()).cyan());

    let pipeline = config.to_pipeline();
    for step in &pipeline.steps {
        let kind = match &step.action {
            StepAction::Run { .. } => "run",
            StepAction::Toolchain(_) => "toolchain",
        };
        println!(
            "    {}. {} [{}] {}",
            step.index + 1,
            style(&step.name).bold(),
            kind,
            style(step.describe()).dim()
        );
    }

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(0)
}

async fn show_history(cmd: &HistoryCommand) -> Result<i32> {
    let store = history_store().await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.json)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(0);
    }

    if cmd.pipelines {
        let names = store.list_pipelines().await?;
        if cmd.json {
            let data = serde_json::json!({ "pipelines": names });
            println!("{}", serde_json::to_string_pretty(&data)?);
        } else if names.is_empty() {
            println!("{} No executions found", INFO);
        } else {
            println!("{} Pipelines with recorded runs:", INFO);
            for name in &names {
                println!("  {}", style(name).bold());
            }
        }
        return Ok(0);
    }

    let executions = match &cmd.pipeline {
        Some(pipeline_name) => {
            let mut runs = store.list_executions(pipeline_name).await?;
            runs.truncate(cmd.limit);
            runs
        }
        None => store.list_recent(cmd.limit).await?,
    };

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(0);
    }

    println!("{} Execution history (showing latest {}):", INFO, cmd.limit);
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(0)
}

fn print_execution_details(summary: &ExecutionSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Trigger: {}", summary.trigger);
    println!("  Status: {}", format_status(summary.status));
    println!("  Exit code: {}", summary.exit_code);
    if let Some(step) = &summary.failed_step {
        println!("  Failed step: {}", style(step).red());
    }
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{})",
        style(format!("{:.0}%", summary.progress() * 100.0)).cyan(),
        summary.completed_steps,
        summary.total_steps
    );

    Ok(())
}
