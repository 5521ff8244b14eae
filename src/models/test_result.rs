//! Results of running tests and suites
//!
//! A leaf result counts as exactly one test case in its own status. A suite
//! result's counts are the sums of its children, accumulated through
//! [`TestResult::add_result`] and never assigned directly.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::failure::TestFailure;
use super::report::ResultReport;
use super::result_state::{fold_child_state, FailureSite, ResultState, TestStatus};
use super::test_node::TestNode;

/// Shortest duration ever recorded for a result
pub const MIN_DURATION: Duration = Duration::from_micros(1);

/// Outcome of running one node of the test tree
#[derive(Clone, Debug)]
pub struct TestResult {
    test: Arc<TestNode>,
    state: ResultState,
    message: Option<String>,
    stack_trace: Option<String>,
    output: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    duration: Duration,
    assert_count: u64,
    children: Vec<TestResult>,
    pass_count: usize,
    fail_count: usize,
    skip_count: usize,
    inconclusive_count: usize,
}

impl TestResult {
    pub fn new(test: Arc<TestNode>) -> Self {
        Self {
            test,
            state: ResultState::INCONCLUSIVE,
            message: None,
            stack_trace: None,
            output: String::new(),
            start_time: None,
            end_time: None,
            duration: Duration::ZERO,
            assert_count: 0,
            children: Vec::new(),
            pass_count: 0,
            fail_count: 0,
            skip_count: 0,
            inconclusive_count: 0,
        }
    }

    pub fn test(&self) -> &Arc<TestNode> {
        &self.test
    }

    pub fn state(&self) -> &ResultState {
        &self.state
    }

    pub fn status(&self) -> TestStatus {
        self.state.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn children(&self) -> &[TestResult] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Asserts made by this test, plus those of all children for a suite
    pub fn assert_count(&self) -> u64 {
        self.assert_count
    }

    pub fn pass_count(&self) -> usize {
        self.tally(TestStatus::Passed, self.pass_count)
    }

    pub fn fail_count(&self) -> usize {
        self.tally(TestStatus::Failed, self.fail_count)
    }

    pub fn skip_count(&self) -> usize {
        self.tally(TestStatus::Skipped, self.skip_count)
    }

    pub fn inconclusive_count(&self) -> usize {
        self.tally(TestStatus::Inconclusive, self.inconclusive_count)
    }

    pub fn total_count(&self) -> usize {
        self.pass_count() + self.fail_count() + self.skip_count() + self.inconclusive_count()
    }

    fn tally(&self, status: TestStatus, suite_count: usize) -> usize {
        if self.test.is_suite() {
            suite_count
        } else {
            usize::from(self.state.status == status)
        }
    }

    /// Sets the state, clearing any message and stack trace
    pub fn set_state(&mut self, state: ResultState) {
        self.set_result(state, None, None);
    }

    pub fn set_result(
        &mut self,
        state: ResultState,
        message: Option<String>,
        stack_trace: Option<String>,
    ) {
        self.state = state;
        self.message = message;
        self.stack_trace = stack_trace;
    }

    pub fn record_exception(&mut self, failure: TestFailure) {
        self.record_exception_at(failure, FailureSite::Test);
    }

    /// Records a failure raised at `site`, after stripping invocation wrappers
    pub fn record_exception_at(&mut self, failure: TestFailure, site: FailureSite) {
        let failure = failure.unwrap_invocation();
        let state = failure.result_state().with_site(site);
        let stack_trace = failure.stack_trace().map(str::to_string);
        self.set_result(state, Some(failure.to_string()), stack_trace);
    }

    /// Records a teardown failure, appending to whatever is already recorded
    pub fn record_teardown_exception(&mut self, failure: TestFailure) {
        let failure = failure.unwrap_invocation();

        let mut state = if self.state.matches(&ResultState::CANCELLED) {
            ResultState::CANCELLED
        } else {
            ResultState::ERROR
        };
        if self.test.is_suite() {
            state = state.with_site(FailureSite::TearDown);
        }

        let mut message = format!("TearDown : {failure}");
        if let Some(existing) = &self.message {
            message = format!("{existing}\n{message}");
        }

        let mut stack_trace = format!("--TearDown\n{}", failure.stack_trace().unwrap_or_default());
        if let Some(existing) = &self.stack_trace {
            stack_trace = format!("{existing}\n{stack_trace}");
        }

        self.set_result(state, Some(message), Some(stack_trace));
    }

    /// Folds a finished child into this suite result
    pub fn add_result(&mut self, child: TestResult) {
        debug_assert!(self.test.is_suite(), "only suite results take children");

        self.pass_count += child.pass_count();
        self.fail_count += child.fail_count();
        self.skip_count += child.skip_count();
        self.inconclusive_count += child.inconclusive_count();
        self.assert_count += child.assert_count();

        if let Some(change) = fold_child_state(&self.state, &child.state) {
            self.state = change.state;
            self.message = change.message.map(str::to_string);
        }

        self.children.push(child);
    }

    pub fn add_assert_count(&mut self, count: u64) {
        self.assert_count += count;
    }

    pub fn append_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn set_timing(&mut self, start: DateTime<Utc>, end: DateTime<Utc>, duration: Duration) {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self.duration = duration.max(MIN_DURATION);
    }

    /// Serializable snapshot; children are included when `recursive`
    pub fn to_report(&self, recursive: bool) -> ResultReport {
        let test = &self.test;
        ResultReport {
            id: test.id().to_string(),
            name: test.name().to_string(),
            full_name: test.full_name().to_string(),
            test_type: test.test_type().to_string(),
            result: self.state.status,
            label: self.state.label.to_string(),
            site: self.state.site,
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration.as_secs_f64(),
            test_case_count: test.test_case_count(),
            total: self.total_count(),
            passed: self.pass_count(),
            failed: self.fail_count(),
            inconclusive: self.inconclusive_count(),
            skipped: self.skip_count(),
            asserts: self.assert_count,
            message: self.message.clone(),
            stack_trace: self.stack_trace.clone(),
            output: (!self.output.is_empty()).then(|| self.output.clone()),
            categories: test.categories().to_vec(),
            children: if recursive {
                self.children.iter().map(|c| c.to_report(true)).collect()
            } else {
                Vec::new()
            },
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.state.status.symbol(),
            self.test.full_name(),
            self.duration.as_millis()
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TestBuilder, CHILD_ERRORS_MESSAGE, CHILD_IGNORE_MESSAGE};

    fn leaf(name: &str) -> Arc<TestNode> {
        TestBuilder::case(name, |_| Ok(())).build()
    }

    fn leaf_result(name: &str, state: ResultState) -> TestResult {
        let mut result = TestResult::new(leaf(name));
        result.set_state(state);
        result
    }

    fn suite() -> Arc<TestNode> {
        TestBuilder::suite("Suite").build()
    }

    #[test]
    fn test_leaf_counts_itself_once() {
        let result = leaf_result("A", ResultState::SUCCESS);
        assert_eq!(result.pass_count(), 1);
        assert_eq!(result.fail_count(), 0);
        assert_eq!(result.total_count(), 1);

        let result = leaf_result("B", ResultState::NOT_RUNNABLE);
        assert_eq!(result.fail_count(), 1);
        assert_eq!(result.total_count(), 1);
    }

    #[test]
    fn test_suite_sums_children() {
        let mut result = TestResult::new(suite());
        result.add_result(leaf_result("A", ResultState::SUCCESS));
        result.add_result(leaf_result("B", ResultState::FAILURE));
        result.add_result(leaf_result("C", ResultState::IGNORED));
        result.add_result(leaf_result("D", ResultState::INCONCLUSIVE));

        assert_eq!(result.pass_count(), 1);
        assert_eq!(result.fail_count(), 1);
        assert_eq!(result.skip_count(), 1);
        assert_eq!(result.inconclusive_count(), 1);
        assert_eq!(result.total_count(), 4);
        assert_eq!(result.children().len(), 4);
    }

    #[test]
    fn test_suite_state_follows_children() {
        let mut result = TestResult::new(suite());
        assert_eq!(result.status(), TestStatus::Inconclusive);

        result.add_result(leaf_result("A", ResultState::SUCCESS));
        assert_eq!(result.state(), &ResultState::SUCCESS);
        assert_eq!(result.message(), None);

        result.add_result(leaf_result("B", ResultState::IGNORED));
        assert_eq!(result.status(), TestStatus::Skipped);
        assert_eq!(result.message(), Some(CHILD_IGNORE_MESSAGE));

        result.add_result(leaf_result("C", ResultState::ERROR));
        assert_eq!(result.state(), &ResultState::CHILD_FAILURE);
        assert_eq!(result.message(), Some(CHILD_ERRORS_MESSAGE));

        result.add_result(leaf_result("D", ResultState::SUCCESS));
        result.add_result(leaf_result("E", ResultState::IGNORED));
        assert_eq!(result.state(), &ResultState::CHILD_FAILURE);
    }

    #[test]
    fn test_asserts_accumulate() {
        let mut child = leaf_result("A", ResultState::SUCCESS);
        child.add_assert_count(3);

        let mut result = TestResult::new(suite());
        result.add_assert_count(2);
        result.add_result(child);
        assert_eq!(result.assert_count(), 5);
    }

    #[test]
    fn test_record_exception_unwraps() {
        let mut result = TestResult::new(leaf("A"));
        result.record_exception(
            TestFailure::assertion("expected 1 but was 2")
                .with_stack_trace("at math.rs:3")
                .wrapped(),
        );
        assert_eq!(result.state(), &ResultState::FAILURE);
        assert_eq!(result.message(), Some("expected 1 but was 2"));
        assert_eq!(result.stack_trace(), Some("at math.rs:3"));
    }

    #[test]
    fn test_record_exception_at_setup() {
        let mut result = TestResult::new(suite());
        result.record_exception_at(TestFailure::error("IoError", "no db"), FailureSite::SetUp);
        assert_eq!(result.state(), &ResultState::SET_UP_ERROR);
        assert_eq!(result.message(), Some("IoError : no db"));
    }

    #[test]
    fn test_teardown_exception_appends() {
        let mut result = TestResult::new(leaf("A"));
        result.record_exception(TestFailure::assertion("first").with_stack_trace("trace1"));
        result.record_teardown_exception(
            TestFailure::error("Cleanup", "second").with_stack_trace("trace2"),
        );

        assert_eq!(result.state(), &ResultState::ERROR);
        assert_eq!(result.message(), Some("first\nTearDown : Cleanup : second"));
        assert_eq!(result.stack_trace(), Some("trace1\n--TearDown\ntrace2"));
    }

    #[test]
    fn test_teardown_exception_on_suite_sets_site() {
        let mut result = TestResult::new(suite());
        result.set_state(ResultState::SUCCESS);
        result.record_teardown_exception(TestFailure::assertion("oops"));
        assert_eq!(result.state(), &ResultState::TEAR_DOWN_ERROR);
        assert_eq!(result.message(), Some("TearDown : oops"));
    }

    #[test]
    fn test_teardown_keeps_cancelled() {
        let mut result = TestResult::new(leaf("A"));
        result.set_result(ResultState::CANCELLED, Some("stopped".into()), None);
        result.record_teardown_exception(TestFailure::assertion("late"));
        assert!(result.state().matches(&ResultState::CANCELLED));
    }

    #[test]
    fn test_duration_clamped() {
        let mut result = TestResult::new(leaf("A"));
        let now = Utc::now();
        result.set_timing(now, now, Duration::ZERO);
        assert_eq!(result.duration(), MIN_DURATION);
    }

    #[test]
    fn test_report_snapshot() {
        let mut result = TestResult::new(suite());
        let mut child = leaf_result("A", ResultState::FAILURE);
        child.append_output("hello\n");
        result.add_result(child);

        let shallow = result.to_report(false);
        assert!(shallow.children.is_empty());
        assert_eq!(shallow.failed, 1);
        assert_eq!(shallow.result, TestStatus::Failed);

        let deep = result.to_report(true);
        assert_eq!(deep.children.len(), 1);
        assert_eq!(deep.children[0].output.as_deref(), Some("hello\n"));
    }
}
