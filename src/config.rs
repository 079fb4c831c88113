//! Configuration from `scout.yaml` and the environment.
//!
//! Precedence, highest first: command-line flag, environment variable,
//! config file, built-in default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runner::RunnerConfig;
use crate::serialization::OutputFormat;

/// Config file looked up in the working directory when none is named.
pub const DEFAULT_CONFIG_FILE: &str = "scout.yaml";

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    IoError { path: PathBuf, source: std::io::Error },
    YamlError(serde_yaml::Error),
    InvalidEnv { name: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(f, "Failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::YamlError(e) => write!(f, "Failed to parse YAML: {}", e),
            ConfigError::InvalidEnv { name, value } => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings shared by every invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoutConfig {
    /// Output format when `--format` is not given
    #[serde(default)]
    pub format: Option<OutputFormat>,

    /// Per-invocation timeout in seconds; unset means no timeout
    #[serde(default)]
    pub invocation_timeout_secs: Option<u64>,

    /// Log filter used when `RUST_LOG` is not set (e.g. "info", "scout=debug")
    #[serde(default)]
    pub log: Option<String>,
}

impl ScoutConfig {
    /// Parse a config file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(ConfigError::YamlError)
    }

    /// Load the config for this process: an explicit path (from `--config`
    /// or `SCOUT_CONFIG`) must exist; otherwise `scout.yaml` is used when
    /// present. Environment overrides are applied on top.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var("SCOUT_CONFIG").ok().map(PathBuf::from);

        let base = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load_from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        base.with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `SCOUT_FORMAT`, `SCOUT_TIMEOUT_SECS` and `SCOUT_LOG`, read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SCOUT_FORMAT") {
            let format = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "SCOUT_FORMAT".to_string(),
                value: value.clone(),
            })?;
            self.format = Some(format);
        }

        if let Some(value) = lookup("SCOUT_TIMEOUT_SECS") {
            let secs = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "SCOUT_TIMEOUT_SECS".to_string(),
                value: value.clone(),
            })?;
            self.invocation_timeout_secs = Some(secs);
        }

        if let Some(value) = lookup("SCOUT_LOG") {
            self.log = Some(value);
        }

        Ok(self)
    }

    /// Pick the output format: CLI flag first, then this config, then text.
    pub fn output_format(&self, cli: Option<OutputFormat>) -> OutputFormat {
        cli.or(self.format).unwrap_or_default()
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            invocation_timeout: self
                .invocation_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}
