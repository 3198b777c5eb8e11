//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{ExecutionStatus, Pipeline, StepAction, StepState, ToolchainState, TriggerEvent},
    execution::{ExecutionResult, StepContext, StepExecutor},
    process::{CommandRunner, OutputCallback, OutputLine, EXIT_INTERRUPTED},
    service::{ServiceHandle, ServiceSpec, ServiceSupervisor},
};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Reason recorded on steps that never ran because an earlier one failed
pub const SKIP_AFTER_FAILURE: &str = "previous step failed";

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        trigger: TriggerEvent,
        total_steps: usize,
    },
    PipelineSkipped {
        execution_id: Uuid,
        pipeline_name: String,
        trigger: TriggerEvent,
    },
    ServiceStarting {
        name: String,
        image: String,
    },
    ServiceReady {
        name: String,
        ports: Vec<u16>,
    },
    ServiceFailed {
        name: String,
        error: String,
    },
    ServiceStopped {
        name: String,
    },
    StepStarted {
        index: usize,
        total: usize,
        name: String,
        description: String,
    },
    StepOutput {
        step_name: String,
        line: OutputLine,
    },
    ToolchainActivated {
        channel: String,
    },
    StepCompleted {
        name: String,
        duration: Duration,
    },
    StepFailed {
        name: String,
        exit_code: i32,
        error: String,
        output_tail: Vec<String>,
    },
    StepSkipped {
        name: String,
        reason: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
        exit_code: i32,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: ExecutionStatus,
    /// 0, or the exit status of the first failing step
    pub exit_code: i32,
    pub failed_step: Option<String>,
    /// Infrastructure error that ended the run before or between steps
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Cancels the run of the engine it was taken from
///
/// Cancellation is observed while services start and while a step runs; a
/// cancel requested in between is picked up at the next of those.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.notify.notify_one();
    }
}

/// Services brought up so far; outlives a cancelled start
#[derive(Debug, Default)]
struct ServiceStartup {
    handles: Vec<ServiceHandle>,
    /// Index of the service whose `start` is in flight
    starting: Option<usize>,
}

/// Forwards a step's output lines to the event handlers
struct EventForwarder<'a> {
    handlers: &'a [EventHandler],
    step_name: &'a str,
}

impl OutputCallback for EventForwarder<'_> {
    fn on_line(&self, line: &OutputLine) {
        for handler in self.handlers {
            handler(ExecutionEvent::StepOutput {
                step_name: self.step_name.to_string(),
                line: line.clone(),
            });
        }
    }
}

/// Main pipeline execution engine
///
/// Runs steps strictly in declared order and stops at the first failure.
pub struct ExecutionEngine<R, S> {
    executor: StepExecutor<R>,
    supervisor: S,
    services: Vec<ServiceSpec>,
    working_dir: Option<PathBuf>,
    event_handlers: Vec<EventHandler>,
    cancel: Arc<Notify>,
}

impl<R: CommandRunner, S: ServiceSupervisor> ExecutionEngine<R, S> {
    pub fn new(runner: R, supervisor: S) -> Self {
        Self {
            executor: StepExecutor::new(runner),
            supervisor,
            services: Vec::new(),
            working_dir: None,
            event_handlers: Vec::new(),
            cancel: Arc::new(Notify::new()),
        }
    }

    /// Services to start before the first step
    pub fn with_services(mut self, services: Vec<ServiceSpec>) -> Self {
        self.services = services;
        self
    }

    /// Directory commands run in (defaults to the current directory)
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// When false, toolchain steps switch the active toolchain without calling rustup
    pub fn with_toolchain_install(mut self, install: bool) -> Self {
        self.executor = self.executor.with_toolchain_install(install);
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            notify: self.cancel.clone(),
        }
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the pipeline for `trigger`
    pub async fn execute(&self, pipeline: &mut Pipeline, trigger: &TriggerEvent) -> RunOutcome {
        let execution_id = pipeline.state.execution_id;
        let total = pipeline.steps.len();

        if !pipeline.should_run(trigger) {
            info!("Pipeline {} not triggered by {}", pipeline.name, trigger);
            pipeline.state.skip(total);
            pipeline.skip_pending("not triggered by this event");
            self.emit_event(ExecutionEvent::PipelineSkipped {
                execution_id,
                pipeline_name: pipeline.name.clone(),
                trigger: trigger.clone(),
            });
            return self.finish(pipeline, None);
        }

        info!("Starting pipeline execution: {} ({})", pipeline.name, execution_id);
        pipeline.state.start(total);
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            trigger: trigger.clone(),
            total_steps: total,
        });

        let run_label = format!("ci-runner-{}", &execution_id.simple().to_string()[..8]);
        let mut startup = ServiceStartup::default();
        let started = tokio::select! {
            biased;
            _ = self.cancel.notified() => None,
            result = self.start_services(&run_label, &mut startup) => Some(result),
        };
        match started {
            None => {
                warn!("Run cancelled while starting services");
                self.abandon_startup(&startup, &run_label).await;
                self.skip_remaining(pipeline, "run cancelled");
                pipeline.state.cancel(EXIT_INTERRUPTED);
                return self.finish(pipeline, Some("run cancelled".to_string()));
            }
            Some(Err(message)) => {
                error!("{}", message);
                self.stop_services(&startup.handles).await;
                self.skip_remaining(pipeline, "service dependency failed");
                pipeline.state.fail(None, 1);
                return self.finish(pipeline, Some(message));
            }
            Some(Ok(())) => {}
        }
        let handles = startup.handles;

        let cancelled = self.run_steps(pipeline).await;

        self.stop_services(&handles).await;

        if cancelled {
            pipeline.state.cancel(EXIT_INTERRUPTED);
            return self.finish(pipeline, Some("run cancelled".to_string()));
        }
        if !pipeline.has_failed() {
            pipeline.state.complete();
        }
        self.finish(pipeline, None)
    }

    /// Run every step in order; returns true when the run was cancelled
    async fn run_steps(&self, pipeline: &mut Pipeline) -> bool {
        let total = pipeline.steps.len();
        let shell = pipeline.shell.clone();
        let env = pipeline.env.clone();
        let mut toolchain = ToolchainState::new();

        for index in 0..total {
            let step = pipeline.steps[index].clone();
            let started_at = Utc::now();
            let clock = Instant::now();
            pipeline.steps[index].state = StepState::Running { started_at };

            self.emit_event(ExecutionEvent::StepStarted {
                index,
                total,
                name: step.name.clone(),
                description: step.describe(),
            });

            let context = StepContext {
                shell: &shell,
                env: &env,
                toolchain: &toolchain,
                working_dir: self.working_dir.as_deref(),
            };
            let forwarder = EventForwarder {
                handlers: &self.event_handlers,
                step_name: &step.name,
            };

            // Cancellation wins when both are ready
            let result = tokio::select! {
                biased;
                _ = self.cancel.notified() => None,
                result = self.executor.execute(&step, &context, Some(&forwarder)) => Some(result),
            };

            let Some(result) = result else {
                warn!("Run cancelled during step {}", step.name);
                pipeline.steps[index].state = StepState::Failed {
                    exit_code: EXIT_INTERRUPTED,
                    error: "cancelled".to_string(),
                    output_tail: Vec::new(),
                    started_at,
                    failed_at: Utc::now(),
                };
                self.emit_event(ExecutionEvent::StepFailed {
                    name: step.name.clone(),
                    exit_code: EXIT_INTERRUPTED,
                    error: "cancelled".to_string(),
                    output_tail: Vec::new(),
                });
                pipeline.state.failed_step = Some(step.name.clone());
                self.skip_remaining(pipeline, "run cancelled");
                return true;
            };

            match result {
                ExecutionResult::Success => {
                    if let StepAction::Toolchain(selection) = &step.action {
                        if toolchain.apply(selection) {
                            info!("Active toolchain is now {}", selection.channel);
                            self.emit_event(ExecutionEvent::ToolchainActivated {
                                channel: selection.channel.clone(),
                            });
                        }
                    }

                    pipeline.steps[index].state = StepState::Completed {
                        exit_code: 0,
                        started_at,
                        completed_at: Utc::now(),
                    };
                    pipeline.state.completed_steps += 1;
                    self.emit_event(ExecutionEvent::StepCompleted {
                        name: step.name.clone(),
                        duration: clock.elapsed(),
                    });
                }
                ExecutionResult::Failed {
                    exit_code,
                    error,
                    output_tail,
                } => {
                    pipeline.steps[index].state = StepState::Failed {
                        exit_code,
                        error: error.clone(),
                        output_tail: output_tail.clone(),
                        started_at,
                        failed_at: Utc::now(),
                    };
                    self.emit_event(ExecutionEvent::StepFailed {
                        name: step.name.clone(),
                        exit_code,
                        error,
                        output_tail,
                    });

                    self.skip_remaining(pipeline, SKIP_AFTER_FAILURE);
                    pipeline.state.fail(Some(step.name.clone()), exit_code);
                    return false;
                }
            }
        }

        false
    }

    /// Start every service and wait for all of them to be reachable
    ///
    /// Progress is recorded in `startup` so the caller can clean up after a
    /// failure or an interrupted start.
    async fn start_services(&self, run_label: &str, startup: &mut ServiceStartup) -> Result<(), String> {
        for (index, spec) in self.services.iter().enumerate() {
            self.emit_event(ExecutionEvent::ServiceStarting {
                name: spec.name.clone(),
                image: spec.image.clone(),
            });
            startup.starting = Some(index);
            let started = self.supervisor.start(spec, run_label).await;
            startup.starting = None;
            match started {
                Ok(handle) => startup.handles.push(handle),
                Err(e) => {
                    self.emit_event(ExecutionEvent::ServiceFailed {
                        name: spec.name.clone(),
                        error: e.to_string(),
                    });
                    return Err(e.to_string());
                }
            }
        }

        for handle in &startup.handles {
            if let Err(e) = self.supervisor.wait_ready(handle).await {
                self.emit_event(ExecutionEvent::ServiceFailed {
                    name: handle.name.clone(),
                    error: e.to_string(),
                });
                return Err(e.to_string());
            }
            self.emit_event(ExecutionEvent::ServiceReady {
                name: handle.name.clone(),
                ports: handle.host_ports(),
            });
        }

        Ok(())
    }

    /// Tear down what an interrupted `start_services` brought up
    async fn abandon_startup(&self, startup: &ServiceStartup, run_label: &str) {
        if let Some(spec) = startup.starting.and_then(|index| self.services.get(index)) {
            if let Err(e) = self.supervisor.discard(spec, run_label).await {
                warn!("{}", e);
            }
        }
        self.stop_services(&startup.handles).await;
    }

    /// Stop services in reverse start order; failures are logged only
    async fn stop_services(&self, handles: &[ServiceHandle]) {
        for handle in handles.iter().rev() {
            match self.supervisor.stop(handle).await {
                Ok(()) => self.emit_event(ExecutionEvent::ServiceStopped {
                    name: handle.name.clone(),
                }),
                Err(e) => warn!("{}", e),
            }
        }
    }

    fn skip_remaining(&self, pipeline: &mut Pipeline, reason: &str) {
        for name in pipeline.skip_pending(reason) {
            self.emit_event(ExecutionEvent::StepSkipped {
                name,
                reason: reason.to_string(),
            });
        }
    }

    fn finish(&self, pipeline: &Pipeline, error: Option<String>) -> RunOutcome {
        let state = &pipeline.state;
        info!(
            "Pipeline execution finished: {} - {:?} (exit {})",
            pipeline.name, state.status, state.exit_code
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id: state.execution_id,
            status: state.status,
            exit_code: state.exit_code,
        });

        RunOutcome {
            status: state.status,
            exit_code: state.exit_code,
            failed_step: state.failed_step.clone(),
            error,
        }
    }
}
