//! Execution context
//!
//! Ambient state handed down the tree while tests run. A child context
//! inherits settings from its parent but gets its own assert counter and
//! output buffer, so concurrent siblings never share mutable counters.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::{ApartmentState, FixtureHooks, TestNode};

use super::dispatcher::WorkItemDispatcher;
use super::listener::TestListener;

/// Per-node execution state, cloned and refined on the way down
#[derive(Clone)]
pub struct ExecutionContext {
    current_test: Option<Arc<TestNode>>,
    start_time: DateTime<Utc>,
    start_instant: Instant,
    assert_count: Arc<AtomicU64>,
    output: Arc<Mutex<String>>,
    listener: Arc<dyn TestListener>,
    dispatcher: Arc<dyn WorkItemDispatcher>,
    fixture_hooks: Option<Arc<FixtureHooks>>,
    test_case_timeout: Option<Duration>,
    culture: String,
    apartment: ApartmentState,
}

impl ExecutionContext {
    /// Root context for a run
    pub fn new(listener: Arc<dyn TestListener>, dispatcher: Arc<dyn WorkItemDispatcher>) -> Self {
        Self {
            current_test: None,
            start_time: Utc::now(),
            start_instant: Instant::now(),
            assert_count: Arc::new(AtomicU64::new(0)),
            output: Arc::new(Mutex::new(String::new())),
            listener,
            dispatcher,
            fixture_hooks: None,
            test_case_timeout: None,
            culture: "en-US".to_string(),
            apartment: ApartmentState::Unknown,
        }
    }

    pub fn with_test_case_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.test_case_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = culture.into();
        self
    }

    pub fn with_apartment(mut self, apartment: ApartmentState) -> Self {
        self.apartment = apartment;
        self
    }

    /// Context for a child item: same ambient settings, fresh counters
    pub fn child(&self) -> Self {
        Self {
            current_test: self.current_test.clone(),
            start_time: Utc::now(),
            start_instant: Instant::now(),
            assert_count: Arc::new(AtomicU64::new(0)),
            output: Arc::new(Mutex::new(String::new())),
            listener: Arc::clone(&self.listener),
            dispatcher: Arc::clone(&self.dispatcher),
            fixture_hooks: self.fixture_hooks.clone(),
            test_case_timeout: self.test_case_timeout,
            culture: self.culture.clone(),
            apartment: self.apartment,
        }
    }

    /// Binds the context to the test about to run and restarts its clock
    pub(crate) fn establish(&mut self, test: &Arc<TestNode>) {
        self.current_test = Some(Arc::clone(test));
        self.start_time = Utc::now();
        self.start_instant = Instant::now();
        if let Some(culture) = test.culture() {
            self.culture = culture.to_string();
        }
    }

    pub fn current_test(&self) -> Option<&Arc<TestNode>> {
        self.current_test.as_ref()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.start_instant.elapsed()
    }

    pub fn increment_assert_count(&self) {
        self.assert_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_asserts(&self, count: u64) {
        self.assert_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn assert_count(&self) -> u64 {
        self.assert_count.load(Ordering::Relaxed)
    }

    /// Captures output for the current test and forwards it to the listener
    pub fn write_output(&self, text: &str) {
        self.output.lock().push_str(text);
        if let Some(test) = &self.current_test {
            self.listener.test_output(test, text);
        }
    }

    pub(crate) fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.lock())
    }

    pub fn listener(&self) -> &Arc<dyn TestListener> {
        &self.listener
    }

    pub fn dispatcher(&self) -> &Arc<dyn WorkItemDispatcher> {
        &self.dispatcher
    }

    /// Per-test hooks of the nearest enclosing fixture
    pub fn fixture_hooks(&self) -> Option<&Arc<FixtureHooks>> {
        self.fixture_hooks.as_ref()
    }

    pub(crate) fn set_fixture_hooks(&mut self, hooks: Arc<FixtureHooks>) {
        self.fixture_hooks = Some(hooks);
    }

    pub fn test_case_timeout(&self) -> Option<Duration> {
        self.test_case_timeout
    }

    pub fn culture(&self) -> &str {
        &self.culture
    }

    pub fn apartment(&self) -> ApartmentState {
        self.apartment
    }

    pub(crate) fn set_apartment(&mut self, apartment: ApartmentState) {
        self.apartment = apartment;
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("current_test", &self.current_test.as_ref().map(|t| t.full_name()))
            .field("assert_count", &self.assert_count())
            .field("test_case_timeout", &self.test_case_timeout)
            .field("culture", &self.culture)
            .field("apartment", &self.apartment)
            .finish()
    }
}
