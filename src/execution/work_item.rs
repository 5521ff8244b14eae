//! Work items
//!
//! A `WorkItem` runs one node of the test tree and fires its completion
//! exactly once. Items that need isolation (a timeout, a dedicated thread or a
//! different apartment) run on a thread of their own; when the timeout
//! elapses first, the item is completed with a failure and its thread is left
//! to finish on its own. A late completion from that thread is discarded.

use chrono::{DateTime, Utc};
use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::filter::TestFilter;
use crate::models::{ApartmentState, ResultState, RunState, TestFailure, TestFn, TestNode, TestResult};

use super::context::ExecutionContext;
use super::listener::TestListener;

/// Lifecycle of a work item
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkItemState {
    Ready,
    Running,
    Complete,
}

impl fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItemState::Ready => write!(f, "Ready"),
            WorkItemState::Running => write!(f, "Running"),
            WorkItemState::Complete => write!(f, "Complete"),
        }
    }
}

pub type CompletionHandler = Box<dyn FnOnce(TestResult) + Send>;

/// Once-only completion slot.
///
/// Clones share the slot. Whoever claims the handler first delivers the
/// result; every later claim comes back empty.
#[derive(Clone)]
pub struct Completion {
    handler: Arc<Mutex<Option<CompletionHandler>>>,
}

impl Completion {
    pub fn new<F>(handler: F) -> Self
    where
        F: FnOnce(TestResult) + Send + 'static,
    {
        Self {
            handler: Arc::new(Mutex::new(Some(Box::new(handler)))),
        }
    }

    /// Delivers the result into a channel
    pub fn to_channel(sender: Sender<TestResult>) -> Self {
        Self::new(move |result| {
            if sender.send(result).is_err() {
                debug!("Completion receiver dropped before the result arrived");
            }
        })
    }

    /// Completion nobody waits for
    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    pub(crate) fn claim(&self) -> Option<CompletionHandler> {
        self.handler.lock().take()
    }

    pub fn is_claimed(&self) -> bool {
        self.handler.lock().is_none()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("claimed", &self.is_claimed())
            .finish()
    }
}

/// Runs a test or suite and reports its result once
pub struct WorkItem {
    pub(super) test: Arc<TestNode>,
    pub(super) result: TestResult,
    pub(super) state: WorkItemState,
    pub(super) filter: Arc<dyn TestFilter>,
    pub(super) explicitly_selected: bool,
    completion: Completion,
}

impl WorkItem {
    pub fn create(test: Arc<TestNode>, filter: Arc<dyn TestFilter>) -> Self {
        let explicitly_selected =
            test.run_state() == RunState::Explicit && filter.is_explicit_match(&test);

        Self {
            result: TestResult::new(Arc::clone(&test)),
            test,
            state: WorkItemState::Ready,
            filter,
            explicitly_selected,
            completion: Completion::ignore(),
        }
    }

    pub fn test(&self) -> &Arc<TestNode> {
        &self.test
    }

    pub fn result(&self) -> &TestResult {
        &self.result
    }

    pub fn state(&self) -> WorkItemState {
        self.state
    }

    pub fn is_composite(&self) -> bool {
        self.test.is_suite()
    }

    /// Replaces the completion subscriber
    pub fn on_completed(&mut self, completion: Completion) {
        self.completion = completion;
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Whether the node's own body and children should run
    pub(super) fn should_run(&self) -> bool {
        match self.test.run_state() {
            RunState::Runnable => true,
            RunState::Explicit => self.explicitly_selected,
            RunState::Skipped | RunState::Ignored | RunState::NotRunnable => false,
        }
    }

    /// Result state recorded when the node does not run
    pub(super) fn skipped_state(&self) -> ResultState {
        match self.test.run_state() {
            RunState::Ignored => ResultState::IGNORED,
            RunState::Explicit => ResultState::EXPLICIT,
            RunState::NotRunnable => ResultState::NOT_RUNNABLE,
            RunState::Skipped | RunState::Runnable => ResultState::SKIPPED,
        }
    }

    /// Records the skip reason, plus the provider stack trace for invalid nodes
    pub(super) fn record_skip(&mut self) {
        let state = self.skipped_state();
        let reason = self.test.skip_reason().map(str::to_string);
        let trace = if self.test.run_state() == RunState::NotRunnable {
            self.test.provider_stack_trace().map(str::to_string)
        } else {
            None
        };
        self.result.set_result(state, reason, trace);
    }

    /// Runs the item under a child of `parent` and fires the completion
    pub fn execute(self, parent: &ExecutionContext) {
        let context = parent.child();

        let timeout = if self.is_composite() {
            None
        } else {
            self.test.timeout().or(context.test_case_timeout())
        };
        let apartment = self.test.apartment();
        let apartment_change =
            apartment != ApartmentState::Unknown && apartment != context.apartment();

        if self.should_run() && (self.test.requires_thread() || timeout.is_some() || apartment_change)
        {
            self.run_on_own_thread(context, timeout, apartment);
        } else {
            self.run_test(context);
        }
    }

    fn run_test(mut self, mut context: ExecutionContext) {
        context.establish(&self.test);
        self.state = WorkItemState::Running;
        context.listener().test_started(&self.test);
        debug!("Running {}", self.test.full_name());

        if self.is_composite() {
            self.perform_composite(&mut context);
        } else {
            self.perform_simple(&context);
        }

        self.work_item_complete(&context);
    }

    fn work_item_complete(mut self, context: &ExecutionContext) {
        let Some(handler) = self.completion.claim() else {
            debug!(
                "{} was already completed, discarding late result {}",
                self.test.full_name(),
                self.result.state()
            );
            return;
        };

        self.state = WorkItemState::Complete;
        self.result.add_assert_count(context.assert_count());
        let output = context.take_output();
        self.result.append_output(&output);
        self.result
            .set_timing(context.start_time(), Utc::now(), context.elapsed());

        context.listener().test_finished(&self.result);
        handler(self.result);
    }

    fn run_on_own_thread(
        self,
        mut context: ExecutionContext,
        timeout: Option<Duration>,
        apartment: ApartmentState,
    ) {
        if apartment != ApartmentState::Unknown {
            context.set_apartment(apartment);
        }

        let watchdog = Watchdog {
            test: Arc::clone(&self.test),
            completion: self.completion.clone(),
            listener: Arc::clone(context.listener()),
            start_time: Utc::now(),
            started: Instant::now(),
        };
        debug!(
            "Running {} on its own thread (timeout: {:?}, apartment: {})",
            watchdog.test.full_name(),
            timeout,
            apartment
        );

        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let spawned = thread::Builder::new()
            .name(format!("test-{}", self.test.id()))
            .spawn(move || {
                self.run_test(context);
                let _ = done_tx.send(());
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!("Unable to start thread for {}: {}", watchdog.test.full_name(), e);
                watchdog.abandon(ResultState::ERROR, format!("Unable to start test thread: {e}"));
                return;
            }
        };

        match timeout {
            Some(limit) => match done_rx.recv_timeout(limit) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => watchdog.join(handle),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "{} exceeded its timeout of {}ms, abandoning its thread",
                        watchdog.test.full_name(),
                        limit.as_millis()
                    );
                    watchdog.abandon(
                        ResultState::FAILURE,
                        format!("Test exceeded Timeout value of {}ms", limit.as_millis()),
                    );
                }
            },
            None if watchdog.test.is_async() => {
                debug!("Not waiting for async test {}", watchdog.test.full_name());
            }
            None => watchdog.join(handle),
        }
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("test", &self.test.full_name())
            .field("state", &self.state)
            .field("explicitly_selected", &self.explicitly_selected)
            .finish()
    }
}

/// Completes an item from outside its thread when that thread cannot
struct Watchdog {
    test: Arc<TestNode>,
    completion: Completion,
    listener: Arc<dyn TestListener>,
    start_time: DateTime<Utc>,
    started: Instant,
}

impl Watchdog {
    fn join(&self, handle: JoinHandle<()>) {
        if handle.join().is_err() {
            error!("Thread running {} panicked", self.test.full_name());
            self.abandon(ResultState::ERROR, "Test thread panicked".to_string());
        }
    }

    /// Delivers a synthesized result unless the item already completed
    fn abandon(&self, state: ResultState, message: String) {
        let Some(handler) = self.completion.claim() else {
            return;
        };

        let mut result = TestResult::new(Arc::clone(&self.test));
        result.set_result(state, Some(message), None);
        result.set_timing(self.start_time, Utc::now(), self.started.elapsed());

        self.listener.test_finished(&result);
        handler(result);
    }
}

/// Calls a test body or hook, turning panics into failures
pub(super) fn invoke(hook: &TestFn, context: &ExecutionContext) -> Result<(), TestFailure> {
    match panic::catch_unwind(AssertUnwindSafe(|| hook(context))) {
        Ok(outcome) => outcome.map_err(TestFailure::unwrap_invocation),
        Err(payload) => Err(TestFailure::from_panic(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{NullListener, SimpleWorkItemDispatcher};
    use crate::filter::EmptyFilter;
    use crate::models::{TestBuilder, TestStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> ExecutionContext {
        ExecutionContext::new(Arc::new(NullListener), Arc::new(SimpleWorkItemDispatcher))
    }

    fn run(test: Arc<TestNode>, context: &ExecutionContext) -> TestResult {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut item = WorkItem::create(test, Arc::new(EmptyFilter));
        item.on_completed(Completion::to_channel(tx));
        item.execute(context);
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[derive(Default)]
    struct CountingListener {
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    impl TestListener for CountingListener {
        fn test_started(&self, _test: &TestNode) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn test_finished(&self, _result: &TestResult) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_completion_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let completion = Completion::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let test = TestBuilder::case("A", |_| Ok(())).build();
        for _ in 0..3 {
            if let Some(handler) = completion.clone().claim() {
                handler(TestResult::new(test.clone()));
            }
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(completion.is_claimed());
    }

    #[test]
    fn test_passing_test() {
        let test = TestBuilder::case("Passes", |ctx| {
            ctx.add_asserts(2);
            ctx.write_output("hello");
            Ok(())
        })
        .build();

        let result = run(test, &context());
        assert_eq!(result.state(), &ResultState::SUCCESS);
        assert_eq!(result.assert_count(), 2);
        assert_eq!(result.output(), "hello");
        assert!(result.start_time().is_some());
        assert!(result.duration() > Duration::ZERO);
    }

    #[test]
    fn test_panicking_test_is_error() {
        let test = TestBuilder::case("Panics", |_| panic!("kaboom")).build();
        let result = run(test, &context());
        assert_eq!(result.state(), &ResultState::ERROR);
        assert_eq!(result.message(), Some("panicked : kaboom"));
    }

    #[test]
    fn test_listener_sees_start_and_finish() {
        let listener = Arc::new(CountingListener::default());
        let ctx = ExecutionContext::new(listener.clone(), Arc::new(SimpleWorkItemDispatcher));
        let test = TestBuilder::case("A", |_| Ok(())).build();

        run(test, &ctx);
        assert_eq!(listener.started.load(Ordering::SeqCst), 1);
        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_fails_and_abandons_thread() {
        let test = TestBuilder::case("Sleeper", |_| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .timeout_ms(50)
        .build();

        let started = Instant::now();
        let result = run(test, &context());
        assert!(started.elapsed() < Duration::from_millis(450));
        assert_eq!(result.status(), TestStatus::Failed);
        assert_eq!(result.message(), Some("Test exceeded Timeout value of 50ms"));
    }

    #[test]
    fn test_late_completion_is_discarded() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let test = TestBuilder::case("Sleeper", |_| {
            thread::sleep(Duration::from_millis(100));
            Ok(())
        })
        .timeout_ms(10)
        .build();

        let mut item = WorkItem::create(test, Arc::new(EmptyFilter));
        item.on_completed(Completion::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        item.execute(&context());

        thread::sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_timeout_from_context() {
        let test = TestBuilder::case("Sleeper", |_| {
            thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .build();

        let ctx = context().with_test_case_timeout(Some(Duration::from_millis(20)));
        let result = run(test, &ctx);
        assert_eq!(result.message(), Some("Test exceeded Timeout value of 20ms"));
    }

    #[test]
    fn test_requires_thread_runs_elsewhere() {
        let caller = thread::current().id();
        let test = TestBuilder::case("Threaded", move |_| {
            if thread::current().id() == caller {
                Err(TestFailure::assertion("ran on the calling thread"))
            } else {
                Ok(())
            }
        })
        .requires_thread()
        .build();

        let result = run(test, &context());
        assert_eq!(result.state(), &ResultState::SUCCESS);
    }

    #[test]
    fn test_skipped_test_records_reason() {
        let test = TestBuilder::case("Later", |_| Ok(())).ignore("not today").build();
        let result = run(test, &context());
        assert_eq!(result.state(), &ResultState::IGNORED);
        assert_eq!(result.message(), Some("not today"));
    }

    #[test]
    fn test_explicit_test_not_selected() {
        let test = TestBuilder::case("Manual", |_| Ok(())).explicit("by hand").build();
        let result = run(test, &context());
        assert_eq!(result.state(), &ResultState::EXPLICIT);
    }

    #[test]
    fn test_not_runnable_keeps_provider_trace() {
        let test = TestBuilder::case("Bad", |_| Ok(()))
            .not_runnable("Method has non-void return value")
            .provider_stack_trace("at provider.rs:7")
            .build();
        let result = run(test, &context());
        assert_eq!(result.state(), &ResultState::NOT_RUNNABLE);
        assert_eq!(result.stack_trace(), Some("at provider.rs:7"));
    }
}
