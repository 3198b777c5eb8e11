//! Service containers through the `docker` CLI

use crate::process::{CommandRunner, Invocation};
use crate::service::{wait_for_port, ServiceError, ServiceHandle, ServiceSpec, ServiceSupervisor};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the docker supervisor
#[derive(Debug, Clone)]
pub struct DockerSupervisorConfig {
    /// Path to the docker executable
    pub docker_path: String,

    /// Host the published ports are checked on
    pub ready_host: String,

    /// How long to wait for each port to accept connections
    pub readiness_timeout: Duration,

    /// Delay between readiness checks
    pub ready_interval: Duration,

    /// Timeout for each docker CLI call (image pulls included)
    pub command_timeout: Duration,
}

impl Default for DockerSupervisorConfig {
    fn default() -> Self {
        Self {
            docker_path: "docker".to_string(),
            ready_host: "127.0.0.1".to_string(),
            readiness_timeout: Duration::from_secs(30),
            ready_interval: Duration::from_millis(250),
            command_timeout: Duration::from_secs(600),
        }
    }
}

/// Starts services as detached containers and removes them afterwards
pub struct DockerSupervisor<R> {
    runner: R,
    config: DockerSupervisorConfig,
}

impl<R: CommandRunner> DockerSupervisor<R> {
    pub fn new(runner: R, config: DockerSupervisorConfig) -> Self {
        Self { runner, config }
    }

    /// Arguments for `docker run`
    pub fn run_args(spec: &ServiceSpec, container_name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
        ];
        for port in &spec.ports {
            args.push("--publish".to_string());
            args.push(port.to_string());
        }
        for (key, value) in &spec.env {
            args.push("--env".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.extend(spec.options.iter().cloned());
        args.push(spec.image.clone());
        args
    }

    /// Name given to the container of `spec` in the run labelled `run_label`
    pub fn container_name(spec: &ServiceSpec, run_label: &str) -> String {
        format!("{}-{}", run_label, spec.name)
    }

    fn invocation(&self, args: Vec<String>) -> Invocation {
        Invocation::new(self.config.docker_path.clone(), args).with_timeout(self.config.command_timeout)
    }

    /// `docker rm --force <container>`
    async fn remove(&self, service: &str, container: &str) -> Result<(), ServiceError> {
        let invocation = self.invocation(vec![
            "rm".to_string(),
            "--force".to_string(),
            container.to_string(),
        ]);

        let output = self
            .runner
            .run(&invocation, None)
            .await
            .map_err(|e| ServiceError::Stop {
                name: service.to_string(),
                reason: e.to_string(),
            })?;

        if !output.success() {
            warn!("docker rm for {} exited with {}", service, output.code());
            return Err(ServiceError::Stop {
                name: service.to_string(),
                reason: output.tail.join("\n"),
            });
        }
        Ok(())
    }

    /// Fails unless docker reports the container as running
    async fn ensure_running(&self, handle: &ServiceHandle) -> Result<(), ServiceError> {
        let invocation = self.invocation(vec![
            "inspect".to_string(),
            "--format".to_string(),
            "{{.State.Running}}".to_string(),
            handle.container.clone(),
        ]);
        let not_running = |reason: String| ServiceError::NotRunning {
            name: handle.name.clone(),
            reason,
        };

        let output = self
            .runner
            .run(&invocation, None)
            .await
            .map_err(|e| not_running(e.to_string()))?;
        let state = output.tail.last().map(|line| line.trim()).unwrap_or_default();

        if !output.success() {
            return Err(not_running(format!(
                "docker inspect exited with code {}: {}",
                output.code(),
                output.tail.join("\n").trim()
            )));
        }
        if state != "true" {
            return Err(not_running(format!("container state is '{}'", state)));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: CommandRunner> ServiceSupervisor for DockerSupervisor<R> {
    async fn start(&self, spec: &ServiceSpec, run_label: &str) -> Result<ServiceHandle, ServiceError> {
        let container_name = Self::container_name(spec, run_label);
        let invocation = self.invocation(Self::run_args(spec, &container_name));
        info!("Starting service {} ({})", spec.name, spec.image);
        debug!("{}", invocation.command_line());

        let failure = match self.runner.run(&invocation, None).await {
            Ok(output) if output.success() => {
                // `docker run --detach` prints the container id as its last line
                let container = output
                    .tail
                    .iter()
                    .rev()
                    .map(|line| line.trim())
                    .find(|line| !line.is_empty())
                    .map(str::to_string)
                    .unwrap_or(container_name);

                return Ok(ServiceHandle {
                    name: spec.name.clone(),
                    container,
                    ports: spec.ports.clone(),
                });
            }
            Ok(output) => format!(
                "docker exited with code {}: {}",
                output.code(),
                output.tail.join("\n").trim()
            ),
            Err(e) => e.to_string(),
        };

        // The container may exist even though `docker run` failed
        if let Err(e) = self.remove(&spec.name, &container_name).await {
            debug!("No container to clean up for {}: {}", spec.name, e);
        }

        Err(ServiceError::Start {
            name: spec.name.clone(),
            reason: failure,
        })
    }

    async fn wait_ready(&self, handle: &ServiceHandle) -> Result<(), ServiceError> {
        self.ensure_running(handle).await?;

        for port in handle.host_ports() {
            let ready = wait_for_port(
                &self.config.ready_host,
                port,
                self.config.readiness_timeout,
                self.config.ready_interval,
            )
            .await;
            if !ready {
                // Report a crashed container rather than a closed port
                self.ensure_running(handle).await?;
                return Err(ServiceError::NotReady {
                    name: handle.name.clone(),
                    port,
                    waited_secs: self.config.readiness_timeout.as_secs(),
                });
            }
        }
        info!("Service {} is ready", handle.name);
        Ok(())
    }

    async fn stop(&self, handle: &ServiceHandle) -> Result<(), ServiceError> {
        self.remove(&handle.name, &handle.container).await?;
        info!("Stopped service {}", handle.name);
        Ok(())
    }

    async fn discard(&self, spec: &ServiceSpec, run_label: &str) -> Result<(), ServiceError> {
        let container_name = Self::container_name(spec, run_label);
        self.remove(&spec.name, &container_name).await?;
        info!("Removed interrupted service {}", spec.name);
        Ok(())
    }
}
