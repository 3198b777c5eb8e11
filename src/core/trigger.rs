//! Trigger events and the `on:` section that decides whether a run happens

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// The event a run is started for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// Push to a branch
    Push { branch: String },
    /// Pull request, optionally targeting a base branch
    PullRequest { base: Option<String> },
    /// Local invocation; always runs
    Manual,
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerEvent::Push { branch } => write!(f, "push to {}", branch),
            TriggerEvent::PullRequest { base: Some(base) } => write!(f, "pull request into {}", base),
            TriggerEvent::PullRequest { base: None } => write!(f, "pull request"),
            TriggerEvent::Manual => write!(f, "manual"),
        }
    }
}

/// Branch filter for one event kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchFilter {
    /// Branch patterns; empty means any branch
    #[serde(default)]
    pub branches: Vec<String>,
}

/// The `on:` section of a pipeline
///
/// A listed event with no value (`pull_request:`) is declared with an empty
/// filter; only an absent key leaves the event undeclared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default, deserialize_with = "declared_filter", skip_serializing_if = "Option::is_none")]
    pub push: Option<BranchFilter>,

    #[serde(default, deserialize_with = "declared_filter", skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<BranchFilter>,
}

fn declared_filter<'de, D>(deserializer: D) -> Result<Option<BranchFilter>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<BranchFilter>::deserialize(deserializer).map(|filter| Some(filter.unwrap_or_default()))
}

impl TriggerConfig {
    /// Whether `event` should start a run
    ///
    /// A pipeline without any trigger declared runs on every event.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        if self.push.is_none() && self.pull_request.is_none() {
            return true;
        }

        match event {
            TriggerEvent::Manual => true,
            TriggerEvent::Push { branch } => self
                .push
                .as_ref()
                .is_some_and(|filter| filter_matches(&filter.branches, Some(branch))),
            TriggerEvent::PullRequest { base } => self
                .pull_request
                .as_ref()
                .is_some_and(|filter| filter_matches(&filter.branches, base.as_deref())),
        }
    }

    /// Check every branch pattern compiles
    pub fn validate(&self) -> Result<(), regex::Error> {
        for filter in self.push.iter().chain(self.pull_request.iter()) {
            for pattern in &filter.branches {
                BranchPattern::new(pattern)?;
            }
        }
        Ok(())
    }
}

fn filter_matches(patterns: &[String], branch: Option<&str>) -> bool {
    if patterns.is_empty() {
        return true;
    }
    // A filtered trigger needs a branch to compare against
    let Some(branch) = branch else {
        return false;
    };
    patterns.iter().any(|pattern| match BranchPattern::new(pattern) {
        Ok(pattern) => pattern.matches(branch),
        Err(_) => false,
    })
}

/// A branch glob: `*` matches within one path segment, `**` across segments
#[derive(Debug, Clone)]
pub struct BranchPattern {
    regex: Regex,
}

impl BranchPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut source = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    source.push_str(".*");
                }
                '*' => source.push_str("[^/]*"),
                '?' => source.push_str("[^/]"),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');
        Ok(Self {
            regex: Regex::new(&source)?,
        })
    }

    pub fn matches(&self, branch: &str) -> bool {
        self.regex.is_match(branch)
    }
}
