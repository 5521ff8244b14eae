//! Serializable result snapshots
//!
//! `ResultReport` is what leaves the engine: progress events, stored runs and
//! formatted output are all built from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result_state::{FailureSite, TestStatus};
use super::test_node::TEST_CASE_TYPE;

/// Snapshot of a `TestResult`, optionally with its children
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResultReport {
    pub id: String,
    pub name: String,
    pub full_name: String,
    #[serde(rename = "type")]
    pub test_type: String,
    pub result: TestStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default)]
    pub site: FailureSite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds
    pub duration: f64,
    pub test_case_count: usize,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub inconclusive: usize,
    pub skipped: usize,
    pub asserts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ResultReport>,
}

impl ResultReport {
    pub fn is_test_case(&self) -> bool {
        self.test_type == TEST_CASE_TYPE
    }

    /// "Failed:Error(SetUp)" style state string
    pub fn state_string(&self) -> String {
        let mut s = self.result.to_string();
        if !self.label.is_empty() {
            s.push(':');
            s.push_str(&self.label);
        }
        if self.site != FailureSite::Test {
            s.push_str(&format!("({})", self.site));
        }
        s
    }

    /// Depth-first iterator over this report and all descendants
    pub fn walk(&self) -> Box<dyn Iterator<Item = &ResultReport> + '_> {
        Box::new(std::iter::once(self).chain(self.children.iter().flat_map(|c| c.walk())))
    }

    /// All test-case reports below (or at) this node
    pub fn test_cases(&self) -> impl Iterator<Item = &ResultReport> {
        self.walk().filter(|r| r.is_test_case())
    }

    pub fn duration_ms(&self) -> u64 {
        (self.duration * 1000.0).round() as u64
    }
}
