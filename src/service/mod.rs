//! Auxiliary service containers started for the duration of a run

pub mod docker;
pub mod readiness;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub use docker::{DockerSupervisor, DockerSupervisorConfig};
pub use readiness::wait_for_port;

/// Error types for service supervision
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid port mapping '{0}': expected 'host:container' or 'port'")]
    InvalidPort(String),

    #[error("Failed to start service '{name}': {reason}")]
    Start { name: String, reason: String },

    #[error("Service '{name}' not reachable on port {port} after {waited_secs}s")]
    NotReady {
        name: String,
        port: u16,
        waited_secs: u64,
    },

    #[error("Service '{name}' is not running: {reason}")]
    NotRunning { name: String, reason: String },

    #[error("Failed to stop service '{name}': {reason}")]
    Stop { name: String, reason: String },
}

/// Host port to container port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl PortMapping {
    /// Parse `"6379:6379"` or `"6379"`
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        let invalid = || ServiceError::InvalidPort(value.to_string());
        let parse_port = |text: &str| -> Result<u16, ServiceError> {
            match text.trim().parse::<u16>() {
                Ok(0) | Err(_) => Err(invalid()),
                Ok(port) => Ok(port),
            }
        };

        match value.split_once(':') {
            Some((host, container)) => Ok(Self {
                host: parse_port(host)?,
                container: parse_port(container)?,
            }),
            None => {
                let port = parse_port(value)?;
                Ok(Self {
                    host: port,
                    container: port,
                })
            }
        }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

/// A declared service dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortMapping>,
    /// Extra container runtime arguments, already split
    pub options: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// A started service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub name: String,
    /// Container id or name used to stop the service
    pub container: String,
    pub ports: Vec<PortMapping>,
}

impl ServiceHandle {
    pub fn host_ports(&self) -> Vec<u16> {
        self.ports.iter().map(|p| p.host).collect()
    }
}

/// Starts, checks and stops service dependencies
#[async_trait]
pub trait ServiceSupervisor: Send + Sync {
    /// Start `spec`; `run_label` is unique per run and used to name the container
    async fn start(&self, spec: &ServiceSpec, run_label: &str) -> Result<ServiceHandle, ServiceError>;

    /// Wait until the service accepts connections on its host ports
    async fn wait_ready(&self, handle: &ServiceHandle) -> Result<(), ServiceError>;

    /// Tear the service down
    async fn stop(&self, handle: &ServiceHandle) -> Result<(), ServiceError>;

    /// Remove whatever a `start` of `spec` that never returned a handle left behind
    async fn discard(&self, _spec: &ServiceSpec, _run_label: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Supervisor that starts nothing (services managed elsewhere, or `--no-services`)
#[derive(Debug, Clone, Default)]
pub struct NoopSupervisor;

#[async_trait]
impl ServiceSupervisor for NoopSupervisor {
    async fn start(&self, spec: &ServiceSpec, _run_label: &str) -> Result<ServiceHandle, ServiceError> {
        Ok(ServiceHandle {
            name: spec.name.clone(),
            container: String::new(),
            ports: spec.ports.clone(),
        })
    }

    async fn wait_ready(&self, _handle: &ServiceHandle) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn stop(&self, _handle: &ServiceHandle) -> Result<(), ServiceError> {
        Ok(())
    }
}
