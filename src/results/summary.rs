//! Run summaries
//!
//! Counts finished test cases by outcome and combines the root reports of
//! several suites into a single run-level report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{FailureSite, ResultReport, TestStatus};

/// Test type of the report produced by [`aggregate`]
pub const TEST_RUN_TYPE: &str = "TestRun";

/// Outcome counts for a finished run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    /// Overall state string, e.g. "Failed:Error(Child)"
    pub result: String,
    pub status: TestStatus,
    pub test_count: usize,
    pub passed: usize,
    pub failures: usize,
    pub errors: usize,
    pub invalid: usize,
    pub inconclusive: usize,
    pub skipped: usize,
    pub ignored: usize,
    pub explicit: usize,
    pub asserts: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds
    pub duration: f64,
}

impl RunSummary {
    /// Walks every test case below `report`
    pub fn from_report(report: &ResultReport) -> Self {
        let mut summary = Self {
            name: report.full_name.clone(),
            result: report.state_string(),
            status: report.result,
            asserts: report.asserts,
            start_time: report.start_time,
            end_time: report.end_time,
            duration: report.duration,
            ..Default::default()
        };

        for case in report.test_cases() {
            summary.test_count += 1;
            match case.result {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => match case.label.as_str() {
                    "Error" | "Cancelled" => summary.errors += 1,
                    "Invalid" => summary.invalid += 1,
                    _ => summary.failures += 1,
                },
                TestStatus::Inconclusive => summary.inconclusive += 1,
                TestStatus::Skipped => match case.label.as_str() {
                    "Ignored" => summary.ignored += 1,
                    "Explicit" => summary.explicit += 1,
                    _ => summary.skipped += 1,
                },
            }
        }

        summary
    }

    pub fn run_count(&self) -> usize {
        self.passed + self.failures + self.errors + self.inconclusive
    }

    pub fn not_run_count(&self) -> usize {
        self.invalid + self.skipped + self.ignored + self.explicit
    }

    pub fn failed_count(&self) -> usize {
        self.failures + self.errors + self.invalid
    }

    pub fn is_failure(&self) -> bool {
        self.status == TestStatus::Failed
    }

    pub fn duration_ms(&self) -> u64 {
        (self.duration * 1000.0).round() as u64
    }
}

/// Combines root reports into one run-level report.
///
/// Counts and asserts are summed. The status starts inconclusive; a skipped
/// fragment only moves it from inconclusive, a passed one moves anything but
/// failed, and a failed fragment is final.
pub fn aggregate(name: &str, fragments: Vec<ResultReport>) -> ResultReport {
    let mut status = TestStatus::Inconclusive;
    let mut report = ResultReport {
        id: String::new(),
        name: name.to_string(),
        full_name: name.to_string(),
        test_type: TEST_RUN_TYPE.to_string(),
        result: TestStatus::Inconclusive,
        label: String::new(),
        site: FailureSite::Test,
        start_time: None,
        end_time: None,
        duration: 0.0,
        test_case_count: 0,
        total: 0,
        passed: 0,
        failed: 0,
        inconclusive: 0,
        skipped: 0,
        asserts: 0,
        message: None,
        stack_trace: None,
        output: None,
        categories: Vec::new(),
        children: Vec::new(),
    };

    let mut summed_duration = 0.0;
    for fragment in &fragments {
        report.test_case_count += fragment.test_case_count;
        report.total += fragment.total;
        report.passed += fragment.passed;
        report.failed += fragment.failed;
        report.inconclusive += fragment.inconclusive;
        report.skipped += fragment.skipped;
        report.asserts += fragment.asserts;
        summed_duration += fragment.duration;

        status = match (status, fragment.result) {
            (TestStatus::Failed, _) | (_, TestStatus::Failed) => TestStatus::Failed,
            (_, TestStatus::Passed) => TestStatus::Passed,
            (TestStatus::Inconclusive, TestStatus::Skipped) => TestStatus::Skipped,
            (current, _) => current,
        };

        report.start_time = earliest(report.start_time, fragment.start_time);
        report.end_time = latest(report.end_time, fragment.end_time);
    }

    report.result = status;
    // Fragments run side by side, so wall clock beats the sum when known
    report.duration = match (report.start_time, report.end_time) {
        (Some(start), Some(end)) if end >= start => {
            (end - start).to_std().map(|d| d.as_secs_f64()).unwrap_or(summed_duration)
        }
        _ => summed_duration,
    };
    report.children = fragments;
    report
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TEST_CASE_TYPE;

    fn fragment(
        name: &str,
        result: TestStatus,
        counts: (usize, usize, usize, usize, usize),
        asserts: u64,
    ) -> ResultReport {
        let (total, passed, failed, inconclusive, skipped) = counts;
        ResultReport {
            id: String::new(),
            name: name.into(),
            full_name: name.into(),
            test_type: "Assembly".into(),
            result,
            label: String::new(),
            site: FailureSite::Test,
            start_time: None,
            end_time: None,
            duration: 0.5,
            test_case_count: total,
            total,
            passed,
            failed,
            inconclusive,
            skipped,
            asserts,
            message: None,
            stack_trace: None,
            output: None,
            categories: Vec::new(),
            children: Vec::new(),
        }
    }

    fn case(name: &str, result: TestStatus, label: &str) -> ResultReport {
        let mut r = fragment(name, result, (1, 0, 0, 0, 0), 1);
        r.test_type = TEST_CASE_TYPE.into();
        r.label = label.into();
        r
    }

    #[test]
    fn test_aggregate_two_assemblies() {
        let a = fragment("a.dll", TestStatus::Passed, (23, 23, 0, 0, 0), 40);
        let b = fragment("b.dll", TestStatus::Failed, (42, 31, 4, 5, 2), 53);

        let run = aggregate("run", vec![a, b]);
        assert_eq!(run.total, 65);
        assert_eq!(run.passed, 54);
        assert_eq!(run.failed, 4);
        assert_eq!(run.inconclusive, 5);
        assert_eq!(run.skipped, 2);
        assert_eq!(run.asserts, 93);
        assert_eq!(run.result, TestStatus::Failed);
        assert_eq!(run.children.len(), 2);
        assert!((run.duration - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_status_precedence() {
        let status = |results: &[TestStatus]| {
            let fragments = results
                .iter()
                .map(|r| fragment("f", *r, (0, 0, 0, 0, 0), 0))
                .collect();
            aggregate("run", fragments).result
        };

        assert_eq!(status(&[]), TestStatus::Inconclusive);
        assert_eq!(status(&[TestStatus::Skipped]), TestStatus::Skipped);
        assert_eq!(
            status(&[TestStatus::Skipped, TestStatus::Passed]),
            TestStatus::Passed
        );
        assert_eq!(
            status(&[TestStatus::Passed, TestStatus::Skipped]),
            TestStatus::Passed
        );
        assert_eq!(
            status(&[TestStatus::Failed, TestStatus::Passed]),
            TestStatus::Failed
        );
        assert_eq!(
            status(&[TestStatus::Inconclusive, TestStatus::Inconclusive]),
            TestStatus::Inconclusive
        );
    }

    #[test]
    fn test_summary_counts_by_label() {
        let mut root = fragment("root", TestStatus::Failed, (0, 0, 0, 0, 0), 7);
        root.children = vec![
            case("p", TestStatus::Passed, ""),
            case("f", TestStatus::Failed, ""),
            case("e", TestStatus::Failed, "Error"),
            case("c", TestStatus::Failed, "Cancelled"),
            case("n", TestStatus::Failed, "Invalid"),
            case("i", TestStatus::Inconclusive, ""),
            case("s", TestStatus::Skipped, ""),
            case("g", TestStatus::Skipped, "Ignored"),
            case("x", TestStatus::Skipped, "Explicit"),
        ];

        let summary = RunSummary::from_report(&root);
        assert_eq!(summary.test_count, 9);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.inconclusive, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.explicit, 1);
        assert_eq!(summary.run_count(), 5);
        assert_eq!(summary.not_run_count(), 4);
        assert_eq!(summary.failed_count(), 4);
        assert_eq!(summary.asserts, 7);
        assert!(summary.is_failure());
    }
}
