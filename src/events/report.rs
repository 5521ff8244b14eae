//! Progress reports
//!
//! Reports travel through the dispatcher as JSON strings so any handler can
//! consume them without sharing types with the engine.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::execution::TestListener;
use crate::models::{ResultReport, TestNode, TestResult};

use super::dispatcher::TestEventHandler;

/// A single progress event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TestEvent {
    StartTest {
        id: String,
        name: String,
        #[serde(rename = "full-name")]
        full_name: String,
    },
    StartSuite {
        id: String,
        name: String,
        #[serde(rename = "full-name")]
        full_name: String,
        #[serde(rename = "type")]
        test_type: String,
    },
    TestCase(ResultReport),
    TestSuite(ResultReport),
    TestOutput {
        #[serde(rename = "test-id")]
        test_id: String,
        #[serde(rename = "test-name")]
        test_name: String,
        text: String,
    },
}

impl TestEvent {
    pub fn started(test: &TestNode) -> Self {
        if test.is_suite() {
            TestEvent::StartSuite {
                id: test.id().to_string(),
                name: test.name().to_string(),
                full_name: test.full_name().to_string(),
                test_type: test.test_type().to_string(),
            }
        } else {
            TestEvent::StartTest {
                id: test.id().to_string(),
                name: test.name().to_string(),
                full_name: test.full_name().to_string(),
            }
        }
    }

    /// Finished event; suite reports leave their children out
    pub fn finished(result: &TestResult) -> Self {
        let report = result.to_report(false);
        if result.test().is_suite() {
            TestEvent::TestSuite(report)
        } else {
            TestEvent::TestCase(report)
        }
    }

    pub fn output(test: &TestNode, text: &str) -> Self {
        TestEvent::TestOutput {
            test_id: test.id().to_string(),
            test_name: test.full_name().to_string(),
            text: text.to_string(),
        }
    }

    pub fn parse(report: &str) -> serde_json::Result<Self> {
        serde_json::from_str(report)
    }

    pub fn to_report(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Turns lifecycle notifications into reports for an event handler
pub struct EventReportingListener {
    handler: Arc<dyn TestEventHandler>,
}

impl EventReportingListener {
    pub fn new(handler: Arc<dyn TestEventHandler>) -> Self {
        Self { handler }
    }

    fn send(&self, event: TestEvent) {
        match event.to_report() {
            Ok(report) => self.handler.on_test_event(&report),
            Err(e) => warn!("Unable to serialize progress event: {}", e),
        }
    }
}

impl TestListener for EventReportingListener {
    fn test_started(&self, test: &TestNode) {
        self.send(TestEvent::started(test));
    }

    fn test_finished(&self, result: &TestResult) {
        self.send(TestEvent::finished(result));
    }

    fn test_output(&self, test: &TestNode, text: &str) {
        self.send(TestEvent::output(test, text));
    }
}
