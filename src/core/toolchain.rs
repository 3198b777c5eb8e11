//! Toolchain selection and the active-toolchain state

use serde::{Deserialize, Serialize};

/// Environment variable rustup reads to pick the toolchain for a command
pub const TOOLCHAIN_ENV: &str = "RUSTUP_TOOLCHAIN";

/// A toolchain selection as declared by a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainSelection {
    /// Channel or pinned version (`nightly`, `stable`, `1.54.0`)
    pub channel: String,

    /// Whether this selection replaces the active toolchain
    #[serde(default, rename = "override")]
    pub override_active: bool,

    /// Additional components to install alongside the toolchain
    #[serde(default)]
    pub components: Vec<String>,
}

impl ToolchainSelection {
    /// A selection that only installs `channel`, like a step without `override`
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            override_active: false,
            components: Vec::new(),
        }
    }

    /// A selection that installs `channel` and makes it the active toolchain
    pub fn overriding(channel: impl Into<String>) -> Self {
        Self {
            override_active: true,
            ..Self::new(channel)
        }
    }

    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = components.into_iter().map(Into::into).collect();
        self
    }

    /// The rustup invocation that installs this toolchain
    ///
    /// Returns the program and its arguments.
    pub fn install_command(&self) -> (String, Vec<String>) {
        let mut args = vec![
            "toolchain".to_string(),
            "install".to_string(),
            self.channel.clone(),
            "--profile".to_string(),
            "minimal".to_string(),
        ];
        for component in &self.components {
            args.push("--component".to_string());
            args.push(component.clone());
        }
        ("rustup".to_string(), args)
    }
}

/// Tracks which toolchain is active for the remaining steps of a run
///
/// Holds at most one toolchain; an overriding selection replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainState {
    active: Option<String>,
}

impl ToolchainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently active channel, if any selection has been made
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Apply a selection; returns true when the active toolchain changed
    pub fn apply(&mut self, selection: &ToolchainSelection) -> bool {
        if !selection.override_active {
            return false;
        }
        let changed = self.active.as_deref() != Some(selection.channel.as_str());
        self.active = Some(selection.channel.clone());
        changed
    }

    /// Environment entries to pass to commands run under this state
    pub fn env(&self) -> Vec<(String, String)> {
        self.active
            .iter()
            .map(|channel| (TOOLCHAIN_ENV.to_string(), channel.clone()))
            .collect()
    }
}
