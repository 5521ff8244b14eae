//! Suite Runner - parallel test execution engine
//!
//! A CLI tool that loads suites of tests, runs them as a tree of work items
//! (inline or on worker threads) and reports hierarchical results while
//! streaming progress events to the console.
//!
//! ## Features
//!
//! - One-time fixture setup/teardown with parent failure propagation
//! - Per-test timeouts, own-thread execution and run-state handling
//! - Parallel leaf execution and side-by-side root suites
//! - Id, name, category and exclusion filters
//! - Multiple output formats (Table, JSON, CSV, Summary)
//!
//! ## Usage
//!
//! ```bash
//! # Run a suite file
//! suite-runner run suites/math.yaml
//!
//! # Run in parallel, only fast tests, with labels
//! suite-runner run suites/*.yaml --parallel --workers 8 --category Fast --labels
//!
//! # Inspect a suite and stored results
//! suite-runner explore suites/math.yaml --detailed
//! suite-runner results show
//! suite-runner results delete 20260101_120000_0000
//! ```

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

mod cli;
mod config;
mod events;
mod execution;
mod executor;
mod filter;
mod fixtures;
mod models;
mod output;
mod results;
mod utils;

use cli::Args;
use config::env::{print_env_help, EnvConfig};
use config::AppConfig;
use events::{EventPump, EventReportingListener, TestEventDispatcher};
use executor::TestRunner;
use filter::TestFilter;
use models::{ResultReport, TestNode};
use output::{ConsoleEventHandler, OutputFormat, ResultFormatter};
use results::{ResultsStorage, RunSummary, StoredRun, StoredSettings};
use utils::{init_logger, LogLevel, PhaseTimer};

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let verbose = args.verbose || env.verbose.unwrap_or(false);
    init_logger(LogLevel::from_flags(verbose, args.quiet));

    let config_path = args
        .config
        .clone()
        .or_else(|| env.config_file.as_ref().map(PathBuf::from));

    match args.command {
        cli::Command::Run(run_args) => {
            let failed = run_suites(run_args, config_path.as_deref(), &env)?;
            return Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
        cli::Command::Explore(explore_args) => {
            explore(explore_args)?;
        }
        cli::Command::Results(results_args) => {
            show_results(results_args, config_path.as_deref(), &env)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, config_path.as_deref(), &env)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Config file, then environment, each layer overriding the previous
fn effective_config(path: Option<&Path>, env: &EnvConfig) -> Result<AppConfig> {
    let mut config = AppConfig::load_or_default(path)?;
    config.apply_env(env);
    Ok(config)
}

fn results_storage(config: &AppConfig) -> ResultsStorage {
    match &config.results_dir {
        Some(dir) => ResultsStorage::new(dir),
        None => ResultsStorage::default_dir(),
    }
}

/// Runs every suite file; true when the run failed
fn run_suites(args: cli::RunArgs, config_path: Option<&Path>, env: &EnvConfig) -> Result<bool> {
    let mut phases = PhaseTimer::new();

    let mut config = effective_config(config_path, env)?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(agents) = args.agents {
        config.agents = agents;
    }
    if args.parallel {
        config.parallel = true;
    }
    if let Some(timeout) = args.timeout {
        config.default_timeout_ms = timeout;
    }
    if let Some(format) = &args.format {
        config.format = format.clone();
    }
    if args.labels {
        config.labels = true;
    }
    config.validate()?;

    let format = OutputFormat::from_str(&config.format)
        .with_context(|| format!("Unknown output format: {}", config.format))?;

    let roots = fixtures::discover(&args.files)?;
    let filter: Arc<dyn TestFilter> = Arc::from(args.selection().into_filter());
    phases.mark("load");

    let pump = Arc::new(EventPump::start("event-pump").context("Failed to start event pump")?);
    let dispatcher = Arc::new(TestEventDispatcher::new(pump.clone()));
    dispatcher.add_listener(Arc::new(ConsoleEventHandler::new(
        std::io::stderr(),
        config.labels,
    )));

    let settings = config.run_settings();
    let runner = TestRunner::new(settings.clone())
        .with_listener(Arc::new(EventReportingListener::new(dispatcher)));

    let started_at = Utc::now();
    let results = runner.run_many(&roots, Arc::clone(&filter))?;
    // Deliver queued progress before printing the report
    pump.stop();
    phases.mark("execute");

    let mut fragments: Vec<ResultReport> = results.iter().map(|r| r.to_report(true)).collect();
    let report = if fragments.len() == 1 {
        fragments.remove(0)
    } else {
        results::aggregate("TestRun", fragments)
    };
    let summary = RunSummary::from_report(&report);

    let formatter = ResultFormatter::new(format);
    println!("{}", formatter.format_run(&report)?);

    if let Some(path) = &args.output {
        output::write_run_to_file(path, &report, format)?;
        info!("Wrote results to {}", path);
    }

    if args.save {
        let filter_description = if filter.is_empty() {
            String::new()
        } else {
            format!("{filter:?}")
        };
        let run = StoredRun::new(
            report,
            args.files.iter().map(|p| p.display().to_string()).collect(),
            StoredSettings::new(&settings, filter_description),
            started_at,
        );
        let path = results_storage(&config).save(&run)?;
        println!("Results saved as {} ({})", run.id, path.display());
    }
    phases.mark("report");

    debug!("Phases: {}", phases.summary());
    info!(
        "{}: {} of {} tests failed",
        summary.result,
        summary.failed_count(),
        summary.test_count
    );

    Ok(summary.is_failure())
}

fn explore(args: cli::ExploreArgs) -> Result<()> {
    let root = fixtures::load_suite(&args.file)
        .with_context(|| format!("Loading suite file {}", args.file.display()))?;

    println!("\n{} ({} test cases)", args.file.display(), root.test_case_count());
    println!("{:-<70}", "");
    print_node(&root, 0, args.detailed);
    println!();

    Ok(())
}

fn print_node(node: &Arc<TestNode>, depth: usize, detailed: bool) {
    let indent = "  ".repeat(depth);
    let state = match node.run_state() {
        models::RunState::Runnable => String::new(),
        other => match node.skip_reason() {
            Some(reason) => format!(" [{other}: {reason}]"),
            None => format!(" [{other}]"),
        },
    };
    println!(
        "{:10} {}{} ({}){}",
        node.id(),
        indent,
        node.name(),
        node.test_type(),
        state
    );

    if detailed {
        if !node.categories().is_empty() {
            println!("{:10} {}  categories: {}", "", indent, node.categories().join(", "));
        }
        if let Some(timeout) = node.timeout() {
            println!("{:10} {}  timeout: {}ms", "", indent, timeout.as_millis());
        }
        if node.is_non_parallelizable() {
            println!("{:10} {}  non-parallelizable", "", indent);
        }
        if let Some(hooks) = node.hooks() {
            if !hooks.is_empty() {
                println!(
                    "{:10} {}  hooks: {} one-time setup, {} one-time teardown, {} setup, {} teardown",
                    "",
                    indent,
                    hooks.one_time_setup.len(),
                    hooks.one_time_teardown.len(),
                    hooks.setup.len(),
                    hooks.teardown.len()
                );
            }
        }
    }

    for child in node.children() {
        print_node(child, depth + 1, detailed);
    }
}

fn show_results(args: cli::ResultsArgs, config_path: Option<&Path>, env: &EnvConfig) -> Result<()> {
    let config = effective_config(config_path, env)?;
    let storage = results_storage(&config);

    match args.action {
        cli::ResultsAction::List => {
            let runs = storage.list_runs()?;
            if runs.is_empty() {
                println!("\nNo stored results found in {}.", storage.base_dir().display());
                println!("   Run tests with: suite-runner run <files..> --save");
                return Ok(());
            }

            println!("\n┌──────────────────────┬─────────────────────┬────────────────────────┬───────┬────────┬───────────┐");
            println!("│ Run                  │ Started             │ Result                 │ Tests │ Failed │ Duration  │");
            println!("├──────────────────────┼─────────────────────┼────────────────────────┼───────┼────────┼───────────┤");
            for run in &runs {
                println!(
                    "│ {:20} │ {:19} │ {:22} │ {:5} │ {:6} │ {:>7}ms │",
                    run.id,
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.result,
                    run.test_count,
                    run.failed,
                    run.duration_ms
                );
            }
            println!("└──────────────────────┴─────────────────────┴────────────────────────┴───────┴────────┴───────────┘");
        }

        cli::ResultsAction::Show { id, format } => {
            let format = OutputFormat::from_str(&format)
                .with_context(|| format!("Unknown output format: {format}"))?;

            let run = match id {
                Some(id) => storage.load(&id)?,
                None => match storage.latest()? {
                    Some(run) => run,
                    None => bail!("No stored results in {}", storage.base_dir().display()),
                },
            };

            println!(
                "Run {} from {} ({})",
                run.id,
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                run.sources.join(", ")
            );
            println!("{}", ResultFormatter::new(format).format_run(&run.report)?);
        }

        cli::ResultsAction::Delete { id } => {
            if !storage.delete(&id)? {
                bail!("No stored run {} in {}", id, storage.base_dir().display());
            }
            println!("✓ Deleted run {id}");
        }
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, config_path: Option<&Path>, env: &EnvConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }

            AppConfig::default().save(&path)?;
            println!("✓ Configuration file created: {}", path.display());
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show => {
            let config = effective_config(config_path, env)?;
            println!("{}", serde_yaml::to_string(&config)?);

            if env.has_any() {
                env.print_summary();
            } else {
                print_env_help();
            }
        }
    }

    Ok(())
}
