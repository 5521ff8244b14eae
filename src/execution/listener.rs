//! Test lifecycle listeners

use crate::models::{TestNode, TestResult};

/// Receives lifecycle notifications while work items run.
///
/// Calls arrive from whichever thread runs the test, so implementations must
/// be thread safe and quick.
pub trait TestListener: Send + Sync {
    fn test_started(&self, test: &TestNode);

    fn test_finished(&self, result: &TestResult);

    fn test_output(&self, _test: &TestNode, _text: &str) {}
}

/// Listener that ignores every notification
#[derive(Clone, Copy, Debug, Default)]
pub struct NullListener;

impl TestListener for NullListener {
    fn test_started(&self, _test: &TestNode) {}

    fn test_finished(&self, _result: &TestResult) {}
}
