//! Configuration module
//!
//! Handles loading and managing configuration. Values are layered: command
//! line flags over environment variables over the config file over defaults.

#![allow(dead_code)]

pub mod env;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::RunSettings;
use crate::models::ApartmentState;
use env::EnvConfig;

/// Configuration file locations relative to the working directory (in order of precedence)
const LOCAL_CONFIG_LOCATIONS: &[&str] = &[
    "./suite-runner.yaml",
    "./suite-runner.yml",
    "./suite-runner.json",
    "./.suite-runner.yaml",
];

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker threads for leaf tests in parallel runs
    pub workers: usize,

    /// Root suites run side by side
    pub agents: usize,

    /// Enable parallel execution by default
    pub parallel: bool,

    /// Timeout for tests without their own, in milliseconds (0 = none)
    pub default_timeout_ms: u64,

    /// Culture made current while tests run
    pub culture: String,

    /// Apartment the run starts in (STA or MTA); unset means unknown
    pub apartment: Option<String>,

    /// Output format name (table, json, json-pretty, csv, summary)
    pub format: String,

    /// Print a label as each test starts
    pub labels: bool,

    /// Where run results are stored; platform data dir when unset
    pub results_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            agents: 1,
            parallel: false,
            default_timeout_ms: 0,
            culture: "en-US".to_string(),
            apartment: None,
            format: "table".to_string(),
            labels: false,
            results_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Self = if is_yaml(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = if is_yaml(path.as_ref()) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Load the explicit file, else the first config found, else defaults
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path)
                .with_context(|| format!("Loading config from {}", path.display())),
            None => match find_config_file() {
                Some(path) => Self::load(&path)
                    .with_context(|| format!("Loading config from {}", path.display())),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.agents == 0 {
            bail!("agents must be at least 1");
        }
        if self.culture.trim().is_empty() {
            bail!("culture must not be empty");
        }
        if let Some(apartment) = &self.apartment {
            if ApartmentState::from_str(apartment).is_none() {
                bail!("unknown apartment state '{}', expected STA or MTA", apartment);
            }
        }
        Ok(())
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(workers) = env.workers {
            self.workers = workers;
        }
        if let Some(agents) = env.agents {
            self.agents = agents;
        }
        if let Some(parallel) = env.parallel {
            self.parallel = parallel;
        }
        if let Some(timeout) = env.timeout_ms {
            self.default_timeout_ms = timeout;
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
        if let Some(labels) = env.labels {
            self.labels = labels;
        }
        if let Some(dir) = &env.results_dir {
            self.results_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            workers: self.workers,
            agents: self.agents,
            parallel: self.parallel,
            default_timeout: self.default_timeout(),
            culture: self.culture.clone(),
            apartment: self
                .apartment
                .as_deref()
                .and_then(ApartmentState::from_str)
                .unwrap_or_default(),
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

/// First existing config file: local candidates, then the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    LOCAL_CONFIG_LOCATIONS
        .iter()
        .map(PathBuf::from)
        .chain(user_config_path())
        .find(|p| p.is_file())
}

/// `~/.config/suite-runner/config.yaml` or the platform equivalent
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("suite-runner").join("config.yaml"))
}
