//! Pipeline configuration from YAML

use crate::core::{toolchain::ToolchainSelection, trigger::TriggerConfig, Pipeline};
use crate::service::{PortMapping, ServiceSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a pipeline definition
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Invalid(String),
}

macro_rules! invalid {
    ($($arg:tt)*) => {
        return Err(ConfigError::Invalid(format!($($arg)*)))
    };
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Events that start a run
    #[serde(default, rename = "on")]
    pub triggers: TriggerConfig,

    /// Environment passed to every command
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Auxiliary services started before the first step
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    /// Pipeline steps, in execution order
    pub steps: Vec<StepConfig>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Shell used for `run` commands (invoked as `<shell> -c <command>`)
    #[serde(default)]
    pub shell: Option<String>,
}

/// Service container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Image reference (e.g. `redis:5.0.7`)
    pub image: String,

    /// Port mappings, `host:container` or a single port
    #[serde(default)]
    pub ports: Vec<String>,

    /// Extra options passed to the container runtime
    #[serde(default)]
    pub options: Option<String>,

    /// Environment for the service process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Human-readable step name
    pub name: String,

    /// Shell command to run
    #[serde(default)]
    pub run: Option<String>,

    /// Toolchain to select instead of running a command
    #[serde(default)]
    pub toolchain: Option<ToolchainSelection>,

    /// Extra environment for this step
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory for this step
    #[serde(default)]
    pub working_directory: Option<String>,

    /// Timeout for this step (overrides global)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            invalid!("Pipeline name must not be empty");
        }
        if self.steps.is_empty() {
            invalid!("Pipeline '{}' has no steps", self.name);
        }
        if let Err(e) = self.triggers.validate() {
            invalid!("Invalid branch pattern: {}", e);
        }
        if matches!(&self.shell, Some(shell) if shell.trim().is_empty()) {
            invalid!("Shell must not be empty");
        }

        // Step names are how failures are reported, so they must be unique
        let mut seen_names = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                invalid!("Step names must not be empty");
            }
            if !seen_names.insert(step.name.as_str()) {
                invalid!("Duplicate step name: {}", step.name);
            }

            match (&step.run, &step.toolchain) {
                (Some(_), Some(_)) => {
                    invalid!("Step '{}' has both 'run' and 'toolchain'", step.name)
                }
                (None, None) => {
                    invalid!("Step '{}' needs either 'run' or 'toolchain'", step.name)
                }
                (Some(command), None) if command.trim().is_empty() => {
                    invalid!("Step '{}' has an empty command", step.name)
                }
                (None, Some(selection)) if selection.channel.trim().is_empty() => {
                    invalid!("Step '{}' has an empty toolchain channel", step.name)
                }
                _ => {}
            }

            if step.timeout_secs == Some(0) {
                invalid!("Step '{}' has a zero timeout", step.name);
            }
        }

        let mut host_ports = HashSet::new();
        for (name, service) in &self.services {
            if service.image.trim().is_empty() {
                invalid!("Service '{}' has no image", name);
            }
            for port in &service.ports {
                let mapping = match PortMapping::parse(port) {
                    Ok(mapping) => mapping,
                    Err(e) => invalid!("Service '{}': {}", name, e),
                };
                if !host_ports.insert(mapping.host) {
                    invalid!("Host port {} is mapped more than once", mapping.host);
                }
            }
        }

        Ok(())
    }

    /// Service specs in declaration order (sorted by name)
    pub fn service_specs(&self) -> Result<Vec<ServiceSpec>, ConfigError> {
        self.services
            .iter()
            .map(|(name, service)| {
                let ports = service
                    .ports
                    .iter()
                    .map(|port| PortMapping::parse(port))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ConfigError::Invalid(format!("Service '{}': {}", name, e)))?;
                Ok(ServiceSpec {
                    name: name.clone(),
                    image: service.image.clone(),
                    ports,
                    options: service
                        .options
                        .as_deref()
                        .map(|options| options.split_whitespace().map(str::to_string).collect())
                        .unwrap_or_default(),
                    env: service.env.clone(),
                })
            })
            .collect()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline::from_config(self)
    }
}
