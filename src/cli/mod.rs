//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::filter::Selection;

/// Runs scripted test suites and reports their results
#[derive(Parser, Debug)]
#[command(name = "suite-runner")]
#[command(version)]
#[command(about = "Execute test suites in parallel and report hierarchical results")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test suites
    Run(RunArgs),

    /// Print the test tree of a suite file
    Explore(ExploreArgs),

    /// View stored results
    Results(ResultsArgs),

    /// Show or create configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Suite files to run, one root suite each
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Select tests by id
    #[arg(long = "id")]
    pub ids: Vec<String>,

    /// Select tests by full name
    #[arg(short, long = "test")]
    pub tests: Vec<String>,

    /// Select tests whose full name contains the text
    #[arg(long)]
    pub contains: Vec<String>,

    /// Only run tests in these categories
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Skip tests in these categories
    #[arg(long = "exclude-category")]
    pub exclude_categories: Vec<String>,

    /// Worker threads for leaf tests
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Root suites run side by side
    #[arg(short, long)]
    pub agents: Option<usize>,

    /// Run leaf tests on worker threads
    #[arg(short, long)]
    pub parallel: bool,

    /// Default test timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Print a label as each test starts
    #[arg(short, long)]
    pub labels: bool,

    /// Store the run in the results directory
    #[arg(short, long)]
    pub save: bool,

    /// Also write the formatted results to this file
    #[arg(short, long)]
    pub output: Option<String>,
}

impl RunArgs {
    pub fn selection(&self) -> Selection {
        Selection {
            ids: self.ids.clone(),
            full_names: self.tests.clone(),
            contains: self.contains.clone(),
            categories: self.categories.clone(),
            exclude_categories: self.exclude_categories.clone(),
        }
    }
}

/// Arguments for explore command
#[derive(Parser, Debug)]
pub struct ExploreArgs {
    /// Suite file
    pub file: PathBuf,

    /// Show categories and properties
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    #[command(subcommand)]
    pub action: ResultsAction,
}

#[derive(Subcommand, Debug)]
pub enum ResultsAction {
    /// List stored runs
    List,

    /// Show a stored run, the latest when no id is given
    Show {
        /// Run id
        id: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Delete a stored run
    Delete {
        /// Run id
        id: String,
    },
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration and environment overrides
    Show,

    /// Write a default configuration file
    Init {
        /// Destination
        #[arg(default_value = "suite-runner.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
