//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

#![allow(dead_code)]

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "SUITE_RUNNER";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Leaf workers from SUITE_RUNNER_WORKERS
    pub workers: Option<usize>,
    /// Root agents from SUITE_RUNNER_AGENTS
    pub agents: Option<usize>,
    /// Parallel from SUITE_RUNNER_PARALLEL
    pub parallel: Option<bool>,
    /// Default timeout in ms from SUITE_RUNNER_TIMEOUT
    pub timeout_ms: Option<u64>,
    /// Output format from SUITE_RUNNER_FORMAT
    pub format: Option<String>,
    /// Config file from SUITE_RUNNER_CONFIG
    pub config_file: Option<String>,
    /// Verbose from SUITE_RUNNER_VERBOSE
    pub verbose: Option<bool>,
    /// Labels from SUITE_RUNNER_LABELS
    pub labels: Option<bool>,
    /// Results directory from SUITE_RUNNER_RESULTS_DIR
    pub results_dir: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            workers: get_env_parse("WORKERS"),
            agents: get_env_parse("AGENTS"),
            parallel: get_env_bool("PARALLEL"),
            timeout_ms: get_env_parse("TIMEOUT"),
            format: get_env("FORMAT"),
            config_file: get_env("CONFIG"),
            verbose: get_env_bool("VERBOSE"),
            labels: get_env_bool("LABELS"),
            results_dir: get_env("RESULTS_DIR"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.workers.is_some()
            || self.agents.is_some()
            || self.parallel.is_some()
            || self.timeout_ms.is_some()
            || self.format.is_some()
            || self.config_file.is_some()
            || self.verbose.is_some()
            || self.labels.is_some()
            || self.results_dir.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_WORKERS:     {:?}", ENV_PREFIX, self.workers);
        println!("  {}_AGENTS:      {:?}", ENV_PREFIX, self.agents);
        println!("  {}_PARALLEL:    {:?}", ENV_PREFIX, self.parallel);
        println!("  {}_TIMEOUT:     {:?}", ENV_PREFIX, self.timeout_ms);
        println!("  {}_FORMAT:      {:?}", ENV_PREFIX, self.format);
        println!("  {}_CONFIG:      {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_VERBOSE:     {:?}", ENV_PREFIX, self.verbose);
        println!("  {}_LABELS:      {:?}", ENV_PREFIX, self.labels);
        println!("  {}_RESULTS_DIR: {:?}", ENV_PREFIX, self.results_dir);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables (useful for testing)
#[derive(Default)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn var(mut self, name: &str, value: impl ToString) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.to_string()));
        self
    }

    pub fn workers(self, workers: usize) -> Self {
        self.var("WORKERS", workers)
    }

    pub fn agents(self, agents: usize) -> Self {
        self.var("AGENTS", agents)
    }

    pub fn parallel(self, parallel: bool) -> Self {
        self.var("PARALLEL", parallel)
    }

    pub fn timeout_ms(self, timeout: u64) -> Self {
        self.var("TIMEOUT", timeout)
    }

    pub fn format(self, format: &str) -> Self {
        self.var("FORMAT", format)
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all SUITE_RUNNER environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_WORKERS      Worker threads for parallel runs");
    println!("  {ENV_PREFIX}_AGENTS       Root suites run side by side");
    println!("  {ENV_PREFIX}_PARALLEL     Enable parallel execution (true/false)");
    println!("  {ENV_PREFIX}_TIMEOUT      Default test timeout in milliseconds");
    println!("  {ENV_PREFIX}_FORMAT       Output format (table, json, json-pretty, csv, summary)");
    println!("  {ENV_PREFIX}_CONFIG       Path to configuration file");
    println!("  {ENV_PREFIX}_VERBOSE      Enable verbose output (true/false)");
    println!("  {ENV_PREFIX}_LABELS       Print test labels as tests start (true/false)");
    println!("  {ENV_PREFIX}_RESULTS_DIR  Directory for stored results");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_WORKERS=8");
    println!("  export {ENV_PREFIX}_PARALLEL=true");
    println!("  suite-runner run suites/math.yaml");
}
