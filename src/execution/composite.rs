//! Suite execution
//!
//! A suite runs its one-time setup, hands every selected child to the
//! dispatcher, folds the children's results as they arrive and finally runs
//! its one-time teardown. Results are folded on the suite's own thread, one
//! at a time, so concurrent children never race on the suite result.
//!
//! When setup fails or the suite does not run, children are not executed.
//! Each selected descendant still gets a result, so the suite's counts always
//! match the shape of the tree.

use std::sync::Arc;
use tracing::{debug, error};

use crate::filter::{subtree_filter, TestFilter};
use crate::models::{FailureSite, ResultState, TestNode, TestResult, TestStatus};

use super::context::ExecutionContext;
use super::work_item::{invoke, Completion, WorkItem};

/// Message given to children of a suite whose one-time setup failed
pub const PARENT_SETUP_FAILED_MESSAGE: &str = "Parent SetUp Failed";

impl WorkItem {
    pub(super) fn perform_composite(&mut self, context: &mut ExecutionContext) {
        if !self.should_run() {
            self.skip_fixture(context);
            return;
        }

        self.result.set_state(ResultState::SUCCESS);

        let hooks = self.test.hooks().cloned();
        if let Some(hooks) = &hooks {
            if hooks.has_per_test_hooks() {
                context.set_fixture_hooks(Arc::clone(hooks));
            }
        }

        self.do_one_time_setup(context);

        if self.test.has_children() {
            match self.result.status() {
                TestStatus::Passed => self.run_children(context),
                TestStatus::Skipped | TestStatus::Inconclusive => {
                    let state = self.result.state().clone();
                    let message = self.result.message().map(str::to_string);
                    self.mark_children(context, &state, message.as_deref());
                }
                TestStatus::Failed => {
                    let state = ResultState::FAILURE.with_site(FailureSite::Parent);
                    self.mark_children(context, &state, Some(PARENT_SETUP_FAILED_MESSAGE));
                }
            }
        }

        self.do_one_time_teardown(context);
    }

    fn do_one_time_setup(&mut self, context: &ExecutionContext) {
        let Some(hooks) = self.test.hooks().cloned() else {
            return;
        };

        for hook in &hooks.one_time_setup {
            if let Err(failure) = invoke(hook, context) {
                debug!("One-time setup of {} failed: {}", self.test.full_name(), failure);
                self.result.record_exception_at(failure, FailureSite::SetUp);
                break;
            }
        }
    }

    fn do_one_time_teardown(&mut self, context: &ExecutionContext) {
        let Some(hooks) = self.test.hooks().cloned() else {
            return;
        };

        for hook in hooks.one_time_teardown.iter().rev() {
            if let Err(failure) = invoke(hook, context) {
                self.result.record_teardown_exception(failure);
            }
        }

        if let Some(dispose) = &hooks.dispose {
            if let Err(failure) = invoke(dispose, context) {
                self.result.record_teardown_exception(failure);
            }
        }
    }

    /// Filter handed to children; a suite that matches by itself selects its
    /// subtree, minus whatever the filter excludes
    fn child_filter(&self) -> Arc<dyn TestFilter> {
        if !self.filter.is_empty() && self.filter.matches(&self.test) {
            subtree_filter(&self.filter)
        } else {
            Arc::clone(&self.filter)
        }
    }

    fn run_children(&mut self, context: &ExecutionContext) {
        let filter = self.child_filter();
        let children: Vec<WorkItem> = self
            .test
            .children()
            .iter()
            .filter(|child| filter.pass(child))
            .map(|child| WorkItem::create(Arc::clone(child), Arc::clone(&filter)))
            .collect();

        if children.is_empty() {
            return;
        }

        let expected = children.len();
        let (tx, rx) = crossbeam_channel::unbounded();
        for mut child in children {
            child.on_completed(Completion::to_channel(tx.clone()));
            context.dispatcher().dispatch(child, context.clone());
        }
        drop(tx);

        for received in 0..expected {
            match rx.recv() {
                Ok(result) => self.result.add_result(result),
                Err(_) => {
                    error!(
                        "{} lost {} of {} child results",
                        self.test.full_name(),
                        expected - received,
                        expected
                    );
                    break;
                }
            }
        }
    }

    /// Gives every selected descendant a result without running it
    fn mark_children(&mut self, context: &ExecutionContext, state: &ResultState, message: Option<&str>) {
        let filter = self.child_filter();
        for child in self.test.children() {
            if filter.pass(child) {
                let result = synthesize_result(child, filter.as_ref(), state, message, context);
                self.result.add_result(result);
            }
        }
    }

    fn skip_fixture(&mut self, context: &ExecutionContext) {
        self.record_skip();

        if self.test.has_children() {
            let state = self.result.state().clone();
            let (child_state, message) = if state.status == TestStatus::Failed {
                (
                    ResultState::FAILURE.with_site(FailureSite::Parent),
                    self.result.message().map(str::to_string),
                )
            } else {
                (state, self.result.message().map(str::to_string))
            };
            self.mark_children(context, &child_state, message.as_deref());
        }
    }
}

fn synthesize_result(
    test: &Arc<TestNode>,
    filter: &dyn TestFilter,
    state: &ResultState,
    message: Option<&str>,
    context: &ExecutionContext,
) -> TestResult {
    let mut result = TestResult::new(Arc::clone(test));
    for child in test.children() {
        if filter.pass(child) {
            result.add_result(synthesize_result(child, filter, state, message, context));
        }
    }
    result.set_result(state.clone(), message.map(str::to_string), None);
    context.listener().test_finished(&result);
    result
}
