use crate::error::{EngineError, Result};
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ShellConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell binary commands are run through.
    pub program: String,
    /// Arguments placed before the command text.
    pub args: Vec<String>,
    /// Extra environment for every spawned process.
    pub env: HashMap<String, String>,
    /// How long a shell action may run before the long-running check kicks in.
    pub settle_timeout_ms: u64,
    /// Commands matching any of these never block the chain past the settle
    /// timeout and may exit nonzero without failing the action.
    pub long_running_patterns: Vec<String>,
}

pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 5_000;

fn default_long_running_patterns() -> Vec<String> {
    vec![
        r"\b(npm|pnpm|yarn|bun|npx)\b".to_string(),
        r"\b(dev|serve|start|watch|preview)\b".to_string(),
    ]
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string()],
            env: HashMap::new(),
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
            long_running_patterns: default_long_running_patterns(),
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sandbox directory actions run in; relative action paths resolve here.
    pub workdir: String,
    /// Buffer size of the engine event broadcast.
    pub event_capacity: usize,
    pub shell: ShellConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workdir: "/home/project".to_string(),
            event_capacity: 1024,
            shell: ShellConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read a YAML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check the config for problems that would make the engine misbehave.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !self.workdir.starts_with('/') {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("workdir '{}' must be an absolute path", self.workdir),
            });
        }
        if self.shell.program.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "shell.program is empty".to_string(),
            });
        }
        if self.shell.settle_timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "shell.settle_timeout_ms is 0: every long-running command settles immediately"
                    .to_string(),
            });
        }
        if self.event_capacity == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "event_capacity must be greater than zero".to_string(),
            });
        }
        for pattern in &self.shell.long_running_patterns {
            if let Err(e) = Regex::new(pattern) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("long-running pattern '{pattern}' does not compile: {e}"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// ShellPolicy
// ---------------------------------------------------------------------------

/// Compiled form of [`ShellConfig`] shared by every runner.
#[derive(Debug, Clone)]
pub struct ShellPolicy {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub settle_timeout: Duration,
    long_running: RegexSet,
}

impl ShellPolicy {
    pub fn from_config(config: &ShellConfig) -> Result<Self> {
        // Compile one at a time first so the error names the bad pattern.
        for pattern in &config.long_running_patterns {
            Regex::new(pattern).map_err(|source| EngineError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        let long_running = RegexSet::new(&config.long_running_patterns).map_err(|source| {
            EngineError::InvalidPattern {
                pattern: config.long_running_patterns.join(" | "),
                source,
            }
        })?;

        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            settle_timeout: Duration::from_millis(config.settle_timeout_ms),
            long_running,
        })
    }

    /// Full argument list for running `command` through the shell.
    pub fn invocation(&self, command: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(command.to_string());
        args
    }

    pub fn is_long_running(&self, command: &str) -> bool {
        self.long_running.is_match(command)
    }
}
