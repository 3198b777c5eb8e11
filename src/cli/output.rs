//! CLI output formatting

use crate::{
    core::{ExecutionStatus, StepState},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
    process::OutputStream,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static GEAR: Emoji<'_, '_> = Emoji("🔧 ", "* ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a spinner for a step whose output is not streamed
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// A horizontal rule spanning the terminal width
pub fn separator() -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    "─".repeat(width)
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { exit_code, .. } => style(format!("FAILED (exit {})", exit_code)).red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Skipped => style("SKIPPED").dim().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Skipped => SKIP,
        _ => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} ({}/{}) - {} - exit {}",
        status_icon,
        style(&summary.execution_id.simple().to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.completed_steps,
        summary.total_steps,
        style(&summary.trigger).cyan(),
        summary.exit_code,
    );
    if let Some(step) = &summary.failed_step {
        line.push_str(&format!(" at {}", style(step).red()));
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            trigger,
            total_steps,
        } => format!(
            "{} Starting pipeline {} for {} ({} steps, {})",
            ROCKET,
            style(pipeline_name).bold(),
            style(trigger).cyan(),
            total_steps,
            style(&execution_id.simple().to_string()[..8]).dim()
        ),
        ExecutionEvent::PipelineSkipped {
            pipeline_name, trigger, ..
        } => format!(
            "{} {} is not triggered by {}",
            SKIP,
            style(pipeline_name).bold(),
            style(trigger).cyan()
        ),
        ExecutionEvent::ServiceStarting { name, image } => {
            format!("{} Starting service {} ({})", GEAR, style(name).cyan(), style(image).dim())
        }
        ExecutionEvent::ServiceReady { name, ports } => {
            let ports: Vec<String> = ports.iter().map(u16::to_string).collect();
            format!(
                "{} Service {} ready on port {}",
                CHECK,
                style(name).cyan(),
                style(ports.join(", ")).bold()
            )
        }
        ExecutionEvent::ServiceFailed { name, error } => {
            format!("{} Service {}: {}", CROSS, style(name).red(), style(error).dim())
        }
        ExecutionEvent::ServiceStopped { name } => {
            format!("{} Service {} stopped", INFO, style(name).dim())
        }
        ExecutionEvent::StepStarted {
            index,
            total,
            name,
            description,
        } => format!(
            "[{}/{}] {} {}",
            style(index + 1).cyan(),
            style(total).dim(),
            style(name).bold(),
            style(format!("({})", description)).dim()
        ),
        ExecutionEvent::StepOutput { line, .. } => match line.stream {
            OutputStream::Stdout => line.text.clone(),
            OutputStream::Stderr => style(&line.text).yellow().to_string(),
        },
        ExecutionEvent::ToolchainActivated { channel } => {
            format!("{} Active toolchain: {}", GEAR, style(channel).cyan())
        }
        ExecutionEvent::StepCompleted { name, duration } => format!(
            "{} {} {}",
            CHECK,
            style(name).green(),
            style(format_duration(*duration)).dim()
        ),
        ExecutionEvent::StepFailed {
            name,
            exit_code,
            error,
            ..
        } => format!(
            "{} {} exited with {}: {}",
            CROSS,
            style(name).red(),
            style(exit_code).bold(),
            style(error).dim()
        ),
        ExecutionEvent::StepSkipped { name, reason } => {
            format!("{} {} ({})", SKIP, style(name).dim(), reason)
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
            exit_code,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => format!("{} completed", style("successfully").green()),
                ExecutionStatus::Failed => format!("{} (exit {})", style("failed").red(), exit_code),
                ExecutionStatus::Cancelled => style("cancelled").yellow().to_string(),
                ExecutionStatus::Skipped => style("skipped").dim().to_string(),
                other => format!("{:?}", other),
            };
            format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(&execution_id.simple().to_string()[..8]).dim(),
                status_str
            )
        }
    }
}

/// Format a failed step's captured output, keeping the last `max_lines`
pub fn format_output_tail(lines: &[String], max_lines: usize) -> String {
    let start = lines.len().saturating_sub(max_lines);
    let mut out = String::new();
    if start > 0 {
        out.push_str(&format!("{}\n", style(format!("... ({} earlier lines)", start)).dim()));
    }
    for line in &lines[start..] {
        out.push_str("  │ ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Prints run events to the terminal
///
/// Streams step output line by line, or shows a spinner per step when quiet.
/// In quiet mode a failed step's output tail is printed instead.
pub struct ConsoleReporter {
    quiet: bool,
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            spinner: Mutex::new(None),
        }
    }

    fn finish_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(spinner) = slot.take() {
                spinner.finish_and_clear();
            }
        }
    }

    pub fn handle(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StepOutput { .. } if self.quiet => {}
            ExecutionEvent::StepOutput { .. } => {
                println!("{}", format_execution_event(event));
                let _ = io::stdout().flush();
            }
            ExecutionEvent::StepStarted { name, .. } => {
                println!("\n{}", style(separator()).dim());
                println!("{}", format_execution_event(event));
                if self.quiet {
                    if let Ok(mut slot) = self.spinner.lock() {
                        *slot = Some(create_spinner(name.clone()));
                    }
                }
            }
            ExecutionEvent::StepFailed { output_tail, .. } => {
                self.finish_spinner();
                println!("{}", format_execution_event(event));
                if self.quiet && !output_tail.is_empty() {
                    print!("{}", format_output_tail(output_tail, 20));
                }
            }
            ExecutionEvent::StepCompleted { .. } | ExecutionEvent::PipelineCompleted { .. } => {
                self.finish_spinner();
                println!("{}", format_execution_event(event));
            }
            _ => println!("{}", format_execution_event(event)),
        }
    }
}
