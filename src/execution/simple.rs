//! Leaf test execution
//!
//! Runs the per-test setup chain, the body and the teardown chain. Teardown
//! always runs once setup has been attempted, and its failures are appended
//! to whatever the test already recorded.

use std::sync::Arc;

use crate::models::{FailureSite, FixtureHooks, ResultState};

use super::context::ExecutionContext;
use super::work_item::{invoke, WorkItem};

impl WorkItem {
    pub(super) fn perform_simple(&mut self, context: &ExecutionContext) {
        if self.should_run() {
            self.run_test_method(context);
        } else {
            self.record_skip();
        }
    }

    fn run_test_method(&mut self, context: &ExecutionContext) {
        let Some(body) = self.test.body().cloned() else {
            self.result
                .set_result(ResultState::NOT_RUNNABLE, Some("Test has no body".into()), None);
            return;
        };
        let hooks = context
            .fixture_hooks()
            .cloned()
            .unwrap_or_else(|| Arc::new(FixtureHooks::default()));

        let mut setup_failed = false;
        for hook in &hooks.setup {
            if let Err(failure) = invoke(hook, context) {
                self.result.record_exception_at(failure, FailureSite::SetUp);
                setup_failed = true;
                break;
            }
        }

        if !setup_failed {
            match invoke(&body, context) {
                Ok(()) => self.result.set_state(ResultState::SUCCESS),
                Err(failure) => self.result.record_exception(failure),
            }
        }

        for hook in hooks.teardown.iter().rev() {
            if let Err(failure) = invoke(hook, context) {
                self.result.record_teardown_exception(failure);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::execution::{Completion, ExecutionContext, NullListener, SimpleWorkItemDispatcher};
    use crate::filter::EmptyFilter;
    use crate::models::{FailureSite, ResultState, TestBuilder, TestFailure, TestResult, TestStatus};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn run_fixture(fixture: TestBuilder) -> TestResult {
        let root = fixture.build();
        let ctx = ExecutionContext::new(Arc::new(NullListener), Arc::new(SimpleWorkItemDispatcher));
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut item = root.make_work_item(Arc::new(EmptyFilter));
        item.on_completed(Completion::to_channel(tx));
        item.execute(&ctx);
        rx.recv().unwrap()
    }

    #[test]
    fn test_setup_body_teardown_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2, l3, l4, l5) = (log.clone(), log.clone(), log.clone(), log.clone(), log.clone());

        let result = run_fixture(
            TestBuilder::fixture("Fixture")
                .setup(move |_| {
                    l1.lock().push("base setup");
                    Ok(())
                })
                .setup(move |_| {
                    l2.lock().push("derived setup");
                    Ok(())
                })
                .teardown(move |_| {
                    l3.lock().push("base teardown");
                    Ok(())
                })
                .teardown(move |_| {
                    l4.lock().push("derived teardown");
                    Ok(())
                })
                .child(TestBuilder::case("Test", move |_| {
                    l5.lock().push("body");
                    Ok(())
                })),
        );

        assert_eq!(result.state(), &ResultState::SUCCESS);
        assert_eq!(
            *log.lock(),
            vec!["base setup", "derived setup", "body", "derived teardown", "base teardown"]
        );
    }

    #[test]
    fn test_setup_failure_skips_body_but_runs_teardown() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());

        let result = run_fixture(
            TestBuilder::fixture("Fixture")
                .setup(|_| Err(TestFailure::assertion("setup broke")))
                .teardown(move |_| {
                    l1.lock().push("teardown");
                    Ok(())
                })
                .child(TestBuilder::case("Test", move |_| {
                    l2.lock().push("body");
                    Ok(())
                })),
        );

        let test = &result.children()[0];
        assert_eq!(test.state(), &ResultState::FAILURE.with_site(FailureSite::SetUp));
        assert_eq!(test.message(), Some("setup broke"));
        assert_eq!(*log.lock(), vec!["teardown"]);
    }

    #[test]
    fn test_teardown_failure_appends_to_body_failure() {
        let result = run_fixture(
            TestBuilder::fixture("Fixture")
                .teardown(|_| Err(TestFailure::error("Cleanup", "leaked handle")))
                .child(TestBuilder::case("Test", |_| {
                    Err(TestFailure::assertion("wrong answer"))
                })),
        );

        let test = &result.children()[0];
        assert_eq!(test.state(), &ResultState::ERROR);
        assert_eq!(
            test.message(),
            Some("wrong answer\nTearDown : Cleanup : leaked handle")
        );
    }

    #[test]
    fn test_result_state_exceptions() {
        let result = run_fixture(
            TestBuilder::fixture("Fixture")
                .child(TestBuilder::case("Ignored", |_| {
                    Err(TestFailure::Ignore("later".into()))
                }))
                .child(TestBuilder::case("Unsure", |_| {
                    Err(TestFailure::Inconclusive("no data".into()).wrapped())
                }))
                .child(TestBuilder::case("EarlyExit", |_| {
                    Err(TestFailure::Success("done early".into()))
                })),
        );

        assert_eq!(result.children()[0].state(), &ResultState::IGNORED);
        assert_eq!(result.children()[1].status(), TestStatus::Inconclusive);
        assert_eq!(result.children()[1].message(), Some("no data"));
        assert_eq!(result.children()[2].state(), &ResultState::SUCCESS);
        assert_eq!(result.children()[2].message(), Some("done early"));
    }
}
