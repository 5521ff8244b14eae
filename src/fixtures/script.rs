//! Scripted suites
//!
//! A suite file describes a tree of suites and cases whose outcomes are
//! simulated: each case passes, fails, errors, panics or is ignored as
//! written, optionally after sleeping and counting asserts. Files are YAML or
//! JSON, chosen by extension.
//!
//! ```yaml
//! name: Calculator
//! one-time-setup: { outcome: pass }
//! suites:
//!   - name: Math
//!     categories: [Fast]
//!     cases:
//!       - { name: Add, asserts: 2 }
//!       - { name: Div, outcome: fail, message: "division by zero" }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::execution::ExecutionContext;
use crate::models::{ApartmentState, TestBuilder, TestFailure, TestNode};

/// Errors loading a suite file
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Unable to read suite file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid suite {0}: {1}")]
    Invalid(String, String),
}

/// Simulated outcome of a case or hook
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Pass,
    Fail,
    Error,
    Ignore,
    Inconclusive,
    Panic,
}

impl Outcome {
    fn raise(self, message: &str) -> Result<(), TestFailure> {
        match self {
            Outcome::Pass => Ok(()),
            Outcome::Fail => Err(TestFailure::assertion(message)),
            Outcome::Error => Err(TestFailure::error("ScriptedError", message)),
            Outcome::Ignore => Err(TestFailure::Ignore(message.to_string())),
            Outcome::Inconclusive => Err(TestFailure::Inconclusive(message.to_string())),
            Outcome::Panic => panic!("{message}"),
        }
    }
}

/// Declared run state of a node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptRunState {
    #[default]
    Runnable,
    Skipped,
    Ignored,
    Explicit,
    NotRunnable,
}

/// Behaviour of a fixture hook
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HookScript {
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub asserts: u64,
    #[serde(default)]
    pub output: Option<String>,
}

impl HookScript {
    fn into_fn(
        self,
        default_message: &'static str,
    ) -> impl Fn(&ExecutionContext) -> Result<(), TestFailure> + Send + Sync + 'static {
        move |ctx: &ExecutionContext| {
            ctx.add_asserts(self.asserts);
            if let Some(output) = &self.output {
                ctx.write_output(output);
            }
            self.outcome
                .raise(self.message.as_deref().unwrap_or(default_message))
        }
    }
}

/// A single test case
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CaseScript {
    pub name: String,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sleep_ms: u64,
    #[serde(default)]
    pub asserts: u64,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub run_state: ScriptRunState,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub requires_thread: bool,
    /// Never run alongside other tests
    #[serde(default)]
    pub non_parallelizable: bool,
    #[serde(default)]
    pub apartment: Option<String>,
    #[serde(default)]
    pub culture: Option<String>,
}

/// A suite with nested suites and cases; nested suites run before cases
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SuiteScript {
    pub name: String,
    /// "TestSuite" unless given, e.g. "TestFixture" or "Assembly"
    #[serde(default, rename = "type")]
    pub test_type: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub run_state: ScriptRunState,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub requires_thread: bool,
    /// Never run alongside other tests
    #[serde(default)]
    pub non_parallelizable: bool,
    #[serde(default)]
    pub apartment: Option<String>,
    #[serde(default)]
    pub culture: Option<String>,
    #[serde(default)]
    pub one_time_setup: Option<HookScript>,
    #[serde(default)]
    pub one_time_teardown: Option<HookScript>,
    /// Runs before every case below this suite
    #[serde(default)]
    pub setup: Option<HookScript>,
    /// Runs after every case below this suite
    #[serde(default)]
    pub teardown: Option<HookScript>,
    #[serde(default)]
    pub suites: Vec<SuiteScript>,
    #[serde(default)]
    pub cases: Vec<CaseScript>,
}

impl SuiteScript {
    /// Load a suite file, YAML or JSON by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_yaml = path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false);

        let script: Self = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        script.validate()?;
        Ok(script)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ScriptError> {
        let script: Self = serde_yaml::from_str(content)?;
        script.validate()?;
        Ok(script)
    }

    /// Checks names and apartment values throughout the tree
    pub fn validate(&self) -> Result<(), ScriptError> {
        self.validate_at(&self.name)
    }

    fn validate_at(&self, path: &str) -> Result<(), ScriptError> {
        if self.name.trim().is_empty() {
            return Err(ScriptError::Invalid(
                path.to_string(),
                "suite name must not be empty".into(),
            ));
        }
        check_apartment(path, self.apartment.as_deref())?;

        for case in &self.cases {
            let case_path = format!("{path}.{}", case.name);
            if case.name.trim().is_empty() {
                return Err(ScriptError::Invalid(
                    case_path,
                    "case name must not be empty".into(),
                ));
            }
            check_apartment(&case_path, case.apartment.as_deref())?;
        }

        for suite in &self.suites {
            suite.validate_at(&format!("{path}.{}", suite.name))?;
        }
        Ok(())
    }

    pub fn test_case_count(&self) -> usize {
        self.cases.len() + self.suites.iter().map(|s| s.test_case_count()).sum::<usize>()
    }

    pub fn into_builder(self) -> TestBuilder {
        let mut builder = TestBuilder::suite(self.name);
        if let Some(test_type) = self.test_type {
            builder = builder.test_type(test_type);
        }
        builder = apply_common(
            builder,
            Common {
                categories: self.categories,
                description: self.description,
                run_state: self.run_state,
                reason: self.reason,
                requires_thread: self.requires_thread,
                non_parallelizable: self.non_parallelizable,
                apartment: self.apartment,
                culture: self.culture,
            },
        );

        if let Some(hook) = self.one_time_setup {
            builder = builder.one_time_setup(hook.into_fn("OneTimeSetUp failed"));
        }
        if let Some(hook) = self.one_time_teardown {
            builder = builder.one_time_teardown(hook.into_fn("OneTimeTearDown failed"));
        }
        if let Some(hook) = self.setup {
            builder = builder.setup(hook.into_fn("SetUp failed"));
        }
        if let Some(hook) = self.teardown {
            builder = builder.teardown(hook.into_fn("TearDown failed"));
        }

        builder
            .children(self.suites.into_iter().map(SuiteScript::into_builder))
            .children(self.cases.into_iter().map(CaseScript::into_builder))
    }

    pub fn build(self) -> Arc<TestNode> {
        self.into_builder().build()
    }

    /// Builds the tree as the `index`-th root of a run
    pub fn build_numbered(self, index: usize) -> Arc<TestNode> {
        self.into_builder().build_with_prefix(index)
    }
}

impl CaseScript {
    pub fn into_builder(self) -> TestBuilder {
        let outcome = self.outcome;
        let message = self
            .message
            .unwrap_or_else(|| format!("{} was scripted to {:?}", self.name, outcome));
        let sleep = Duration::from_millis(self.sleep_ms);
        let asserts = self.asserts;
        let output = self.output;

        let mut builder = TestBuilder::case(self.name, move |ctx| {
            if !sleep.is_zero() {
                std::thread::sleep(sleep);
            }
            ctx.add_asserts(asserts);
            if let Some(output) = &output {
                ctx.write_output(output);
            }
            outcome.raise(&message)
        });

        if let Some(timeout) = self.timeout_ms {
            builder = builder.timeout_ms(timeout);
        }

        apply_common(
            builder,
            Common {
                categories: self.categories,
                description: self.description,
                run_state: self.run_state,
                reason: self.reason,
                requires_thread: self.requires_thread,
                non_parallelizable: self.non_parallelizable,
                apartment: self.apartment,
                culture: self.culture,
            },
        )
    }
}

struct Common {
    categories: Vec<String>,
    description: Option<String>,
    run_state: ScriptRunState,
    reason: Option<String>,
    requires_thread: bool,
    non_parallelizable: bool,
    apartment: Option<String>,
    culture: Option<String>,
}

fn apply_common(mut builder: TestBuilder, common: Common) -> TestBuilder {
    for category in common.categories {
        builder = builder.category(category);
    }
    if let Some(description) = common.description {
        builder = builder.description(description);
    }
    if common.requires_thread {
        builder = builder.requires_thread();
    }
    if common.non_parallelizable {
        builder = builder.non_parallelizable();
    }
    if let Some(apartment) = common.apartment.as_deref().and_then(ApartmentState::from_str) {
        builder = builder.apartment(apartment);
    }
    if let Some(culture) = common.culture {
        builder = builder.culture(culture);
    }

    let reason = common.reason.unwrap_or_default();
    match common.run_state {
        ScriptRunState::Runnable => builder,
        ScriptRunState::Skipped => builder.skip(reason),
        ScriptRunState::Ignored => builder.ignore(reason),
        ScriptRunState::Explicit => builder.explicit(reason),
        ScriptRunState::NotRunnable => builder
            .not_runnable(reason)
            .provider_stack_trace("declared not-runnable in suite file"),
    }
}

fn check_apartment(path: &str, apartment: Option<&str>) -> Result<(), ScriptError> {
    match apartment {
        Some(value) if ApartmentState::from_str(value).is_none() => Err(ScriptError::Invalid(
            path.to_string(),
            format!("unknown apartment state '{value}'"),
        )),
        _ => Ok(()),
    }
}

/// Load and build a suite file
pub fn load_suite(path: impl AsRef<Path>) -> Result<Arc<TestNode>, ScriptError> {
    load_suite_numbered(path, 0)
}

/// Loads a suite file as the `index`-th root of a run
pub fn load_suite_numbered(path: impl AsRef<Path>, index: usize) -> Result<Arc<TestNode>, ScriptError> {
    Ok(SuiteScript::load(path)?.build_numbered(index))
}
