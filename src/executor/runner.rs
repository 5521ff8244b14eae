//! Test run orchestration
//!
//! Turns a root suite and a filter into a finished result tree, either inline
//! or with leaf tests spread over worker threads. Several roots can be run
//! side by side on a worker pool.

#![allow(dead_code)]

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::execution::{
    Completion, ExecutionContext, NullListener, ParallelWorkItemDispatcher,
    SimpleWorkItemDispatcher, TestListener, WorkItemDispatcher,
};
use crate::filter::TestFilter;
use crate::models::{ApartmentState, ResultState, TestNode, TestResult};
use crate::utils::Timer;

use super::parallel::{ParallelWorkerPool, TestExecutionTask};

/// How often `run_many` polls the root pool
const POOL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Settings for a test run
#[derive(Clone, Debug, PartialEq)]
pub struct RunSettings {
    /// Worker threads for leaf tests when running in parallel
    pub workers: usize,
    /// Root suites run side by side by `run_many`
    pub agents: usize,
    pub parallel: bool,
    /// Timeout applied to tests without their own
    pub default_timeout: Option<Duration>,
    pub culture: String,
    /// Apartment the run starts in; tests asking for another get their own thread
    pub apartment: ApartmentState,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            agents: 1,
            parallel: false,
            default_timeout: None,
            culture: "en-US".to_string(),
            apartment: ApartmentState::Unknown,
        }
    }
}

/// Test runner for a tree of suites
#[derive(Clone)]
pub struct TestRunner {
    settings: RunSettings,
    listener: Arc<dyn TestListener>,
}

impl TestRunner {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            listener: Arc::new(NullListener),
        }
    }

    /// Set the listener receiving lifecycle notifications
    pub fn with_listener(mut self, listener: Arc<dyn TestListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Run one root suite to completion
    pub fn run(&self, root: &Arc<TestNode>, filter: Arc<dyn TestFilter>) -> Result<TestResult> {
        if !filter.pass(root) {
            info!("Filter selects nothing in {}", root.full_name());
            return Ok(root.make_test_result());
        }

        info!(
            "Running {} ({} test cases, {})",
            root.full_name(),
            root.test_case_count(),
            if self.settings.parallel {
                format!("{} workers", self.settings.workers)
            } else {
                "sequential".to_string()
            }
        );
        let timer = Timer::start(root.full_name());

        let parallel = if self.settings.parallel {
            Some(Arc::new(ParallelWorkItemDispatcher::new(self.settings.workers)?))
        } else {
            None
        };
        let dispatcher: Arc<dyn WorkItemDispatcher> = match &parallel {
            Some(parallel) => Arc::clone(parallel) as Arc<dyn WorkItemDispatcher>,
            None => Arc::new(SimpleWorkItemDispatcher),
        };

        let context = ExecutionContext::new(Arc::clone(&self.listener), dispatcher)
            .with_test_case_timeout(self.settings.default_timeout)
            .with_culture(self.settings.culture.clone())
            .with_apartment(self.settings.apartment);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut item = root.make_work_item(filter);
        item.on_completed(Completion::to_channel(tx));
        item.execute(&context);

        let result = rx
            .recv()
            .context("Root work item finished without reporting a result")?;

        if let Some(parallel) = parallel {
            parallel.shutdown();
        }

        let elapsed = timer.stop();
        info!(
            "{} completed in {}ms - {}: {} passed, {} failed, {} skipped, {} inconclusive",
            root.full_name(),
            elapsed.as_millis(),
            result.state(),
            result.pass_count(),
            result.fail_count(),
            result.skip_count(),
            result.inconclusive_count()
        );

        Ok(result)
    }

    /// Run several root suites, `agents` at a time; results keep input order
    pub fn run_many(
        &self,
        roots: &[Arc<TestNode>],
        filter: Arc<dyn TestFilter>,
    ) -> Result<Vec<TestResult>> {
        let agents = i32::try_from(self.settings.agents).unwrap_or(i32::MAX);
        let mut pool = ParallelWorkerPool::new(agents)?;
        let results = Arc::new(Mutex::new(Vec::with_capacity(roots.len())));

        for (index, root) in roots.iter().enumerate() {
            pool.enqueue(RootTask {
                index,
                root: Arc::clone(root),
                filter: Arc::clone(&filter),
                runner: self.clone(),
                results: Arc::clone(&results),
            })?;
        }

        info!(
            "Running {} root suites on {} agents",
            roots.len(),
            self.settings.agents
        );
        pool.start()?;
        while !pool.wait_all(POOL_POLL_INTERVAL) {
            debug!("Waiting for root suites to finish");
        }

        let mut collected: Vec<(usize, TestResult)> = std::mem::take(&mut *results.lock());
        if collected.len() != roots.len() {
            error!(
                "Only {} of {} root suites reported a result",
                collected.len(),
                roots.len()
            );
        }
        collected.sort_by_key(|(index, _)| *index);

        Ok(collected.into_iter().map(|(_, result)| result).collect())
    }
}

/// One root suite queued on the agent pool
struct RootTask {
    index: usize,
    root: Arc<TestNode>,
    filter: Arc<dyn TestFilter>,
    runner: TestRunner,
    results: Arc<Mutex<Vec<(usize, TestResult)>>>,
}

impl TestExecutionTask for RootTask {
    fn execute(&mut self) {
        let result = match self.runner.run(&self.root, Arc::clone(&self.filter)) {
            Ok(result) => result,
            Err(e) => {
                error!("Run of {} failed: {:#}", self.root.full_name(), e);
                let mut result = self.root.make_test_result();
                result.set_result(ResultState::ERROR, Some(format!("{e:#}")), None);
                result
            }
        };
        self.results.lock().push((self.index, result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{CategoryFilter, EmptyFilter, Selection};
    use crate::models::{TestBuilder, TestFailure, TestStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample(name: &str) -> Arc<TestNode> {
        TestBuilder::suite(name)
            .child(
                TestBuilder::fixture("Math")
                    .child(TestBuilder::case("Add", |ctx| {
                        ctx.increment_assert_count();
                        Ok(())
                    }))
                    .child(TestBuilder::case("Div", |_| {
                        Err(TestFailure::assertion("division by zero"))
                    }))
                    .child(TestBuilder::case("Pow", |_| Ok(())).category("Slow")),
            )
            .build()
    }

    #[test]
    fn test_sequential_run() {
        let runner = TestRunner::new(RunSettings::default());
        let result = runner.run(&sample("Root"), Arc::new(EmptyFilter)).unwrap();

        assert_eq!(result.status(), TestStatus::Failed);
        assert_eq!(result.pass_count(), 2);
        assert_eq!(result.fail_count(), 1);
        assert_eq!(result.assert_count(), 1);
    }

    #[test]
    fn test_parallel_run_matches_sequential_counts() {
        let runner = TestRunner::new(RunSettings {
            parallel: true,
            workers: 3,
            ..Default::default()
        });
        let result = runner.run(&sample("Root"), Arc::new(EmptyFilter)).unwrap();

        assert_eq!(result.pass_count(), 2);
        assert_eq!(result.fail_count(), 1);
        assert_eq!(result.total_count(), 3);
    }

    #[test]
    fn test_filter_excluding_everything() {
        let runner = TestRunner::new(RunSettings::default());
        let result = runner
            .run(&sample("Root"), Arc::new(CategoryFilter::new(["Nope"])))
            .unwrap();

        assert_eq!(result.status(), TestStatus::Inconclusive);
        assert_eq!(result.total_count(), 0);
    }

    #[test]
    fn test_excluded_category_never_runs() {
        let slow_runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&slow_runs);
        let root = TestBuilder::suite("Root")
            .child(
                TestBuilder::fixture("Math")
                    .child(TestBuilder::case("Add", |_| Ok(())))
                    .child(
                        TestBuilder::case("Div", move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .category("Slow"),
                    ),
            )
            .build();
        let filter: Arc<dyn TestFilter> = Arc::from(
            Selection {
                exclude_categories: vec!["Slow".into()],
                ..Default::default()
            }
            .into_filter(),
        );

        for parallel in [false, true] {
            let runner = TestRunner::new(RunSettings {
                parallel,
                ..Default::default()
            });
            let result = runner.run(&root, Arc::clone(&filter)).unwrap();

            assert_eq!(result.total_count(), 1);
            assert_eq!(result.pass_count(), 1);
        }
        assert_eq!(slow_runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_apartment_keeps_matching_tests_inline() {
        let ran_on = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&ran_on);
        let root = TestBuilder::suite("Root")
            .child(
                TestBuilder::case("Sta", move |_| {
                    *seen.lock() = Some(std::thread::current().id());
                    Ok(())
                })
                .apartment(ApartmentState::Sta),
            )
            .build();
        let here = std::thread::current().id();

        let runner = TestRunner::new(RunSettings {
            apartment: ApartmentState::Sta,
            ..Default::default()
        });
        runner.run(&root, Arc::new(EmptyFilter)).unwrap();
        assert_eq!(*ran_on.lock(), Some(here));

        let runner = TestRunner::new(RunSettings::default());
        runner.run(&root, Arc::new(EmptyFilter)).unwrap();
        assert!(ran_on.lock().is_some_and(|id| id != here));
    }

    #[test]
    fn test_zero_workers_is_an_error() {
        let runner = TestRunner::new(RunSettings {
            parallel: true,
            workers: 0,
            ..Default::default()
        });
        assert!(runner.run(&sample("Root"), Arc::new(EmptyFilter)).is_err());
    }

    #[test]
    fn test_run_many_keeps_input_order() {
        let runner = TestRunner::new(RunSettings {
            agents: 3,
            ..Default::default()
        });
        let roots: Vec<_> = ["A", "B", "C", "D"].iter().map(|n| sample(n)).collect();

        let results = runner.run_many(&roots, Arc::new(EmptyFilter)).unwrap();
        let names: Vec<_> = results.iter().map(|r| r.test().name().to_string()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_listener_receives_every_node() {
        #[derive(Default)]
        struct Count(AtomicUsize);
        impl TestListener for Count {
            fn test_started(&self, _test: &TestNode) {}
            fn test_finished(&self, _result: &TestResult) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let listener = Arc::new(Count::default());
        let runner = TestRunner::new(RunSettings::default()).with_listener(listener.clone());
        runner.run(&sample("Root"), Arc::new(EmptyFilter)).unwrap();

        // Root, fixture and three cases
        assert_eq!(listener.0.load(Ordering::SeqCst), 5);
    }
}
