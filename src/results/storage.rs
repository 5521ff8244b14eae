//! Results storage and retrieval
//!
//! Provides persistent storage for finished runs in JSON format.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::executor::RunSettings;
use crate::models::ResultReport;

use super::summary::RunSummary;

/// Stored test run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRun {
    /// Unique run ID
    pub id: String,

    /// Suite files the run was loaded from
    pub sources: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    pub settings: StoredSettings,
    pub summary: RunSummary,

    /// Full result tree
    pub report: ResultReport,

    pub environment: EnvironmentInfo,
}

/// Settings the run used
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    pub parallel: bool,
    pub workers: usize,
    pub agents: usize,
    pub default_timeout_ms: Option<u64>,
    pub culture: String,
    /// Description of the filter, empty when everything ran
    pub filter: String,
}

impl StoredSettings {
    pub fn new(settings: &RunSettings, filter: impl Into<String>) -> Self {
        Self {
            parallel: settings.parallel,
            workers: settings.workers,
            agents: settings.agents,
            default_timeout_ms: settings.default_timeout.map(|t| t.as_millis() as u64),
            culture: settings.culture.clone(),
            filter: filter.into(),
        }
    }
}

/// Environment information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: String,
    pub arch: String,
    pub tool_version: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl StoredRun {
    pub fn new(
        report: ResultReport,
        sources: Vec<String>,
        settings: StoredSettings,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_run_id(),
            sources,
            started_at,
            completed_at: Utc::now(),
            settings,
            summary: RunSummary::from_report(&report),
            report,
            environment: EnvironmentInfo::default(),
        }
    }
}

/// Generate unique run ID
fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

/// Results storage manager
pub struct ResultsStorage {
    /// Base directory for results
    base_dir: PathBuf,
}

impl ResultsStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create with default directory
    pub fn default_dir() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("suite-runner")
            .join("results");
        Self::new(base_dir)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(format!("{run_id}.json"))
    }

    /// Save a test run
    pub fn save(&self, run: &StoredRun) -> Result<PathBuf> {
        fs::create_dir_all(&self.base_dir).context("Failed to create results directory")?;

        let path = self.run_path(&run.id);
        let file = File::create(&path).context("Failed to create results file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, run).context("Failed to write results")?;

        info!("Saved test results to {}", path.display());
        Ok(path)
    }

    /// Load a test run
    pub fn load(&self, run_id: &str) -> Result<StoredRun> {
        let path = self.run_path(run_id);
        let run = self
            .load_from_path(&path)
            .with_context(|| format!("No stored run '{run_id}'"))?;

        debug!("Loaded test results from {}", path.display());
        Ok(run)
    }

    /// Load from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<StoredRun> {
        let file = File::open(path).context("Failed to open results file")?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse results")
    }

    /// All stored runs, newest first
    pub fn load_all(&self) -> Result<Vec<StoredRun>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match self.load_from_path(&path) {
                    Ok(run) => runs.push(run),
                    Err(e) => {
                        debug!("Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    /// Brief information on stored runs, newest first
    pub fn list_runs(&self) -> Result<Vec<RunInfo>> {
        Ok(self
            .load_all()?
            .into_iter()
            .map(|run| {
                let failed = run.summary.failed_count();
                let duration_ms = run.summary.duration_ms();
                RunInfo {
                    id: run.id,
                    started_at: run.started_at,
                    result: run.summary.result,
                    test_count: run.summary.test_count,
                    failed,
                    duration_ms,
                }
            })
            .collect())
    }

    /// Most recent run
    pub fn latest(&self) -> Result<Option<StoredRun>> {
        Ok(self.load_all()?.into_iter().next())
    }

    /// Delete a run; false when no such run is stored
    pub fn delete(&self, run_id: &str) -> Result<bool> {
        if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id.contains("..") {
            bail!("Invalid run id '{run_id}'");
        }
        let path = self.run_path(run_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;
        info!("Deleted results: {}", path.display());
        Ok(true)
    }
}

/// Brief run information
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub result: String,
    pub test_count: usize,
    pub failed: usize,
    pub duration_ms: u64,
}
