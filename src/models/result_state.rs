//! Result states for tests and suites
//!
//! A `ResultState` is a status plus an optional label and the site where a
//! failure happened. Suite states are derived from their children through
//! [`fold_child_state`].

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Message used when a suite is failed because of its children
pub const CHILD_ERRORS_MESSAGE: &str = "One or more child tests had errors";

/// Message used when a suite is ignored because of its children
pub const CHILD_IGNORE_MESSAGE: &str = "One or more child tests were ignored";

/// Overall outcome of a test
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    #[default]
    Inconclusive,
    Skipped,
    Passed,
    Failed,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Passed => "✓",
            TestStatus::Failed => "✗",
            TestStatus::Skipped => "○",
            TestStatus::Inconclusive => "?",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Inconclusive" => Some(TestStatus::Inconclusive),
            "Skipped" => Some(TestStatus::Skipped),
            "Passed" => Some(TestStatus::Passed),
            "Failed" => Some(TestStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Inconclusive => write!(f, "Inconclusive"),
            TestStatus::Skipped => write!(f, "Skipped"),
            TestStatus::Passed => write!(f, "Passed"),
            TestStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Where a failure was detected
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureSite {
    #[default]
    Test,
    SetUp,
    TearDown,
    Parent,
    Child,
}

impl fmt::Display for FailureSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureSite::Test => "Test",
            FailureSite::SetUp => "SetUp",
            FailureSite::TearDown => "TearDown",
            FailureSite::Parent => "Parent",
            FailureSite::Child => "Child",
        };
        f.write_str(name)
    }
}

/// Status, label and failure site of a result
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultState {
    pub status: TestStatus,
    pub label: Cow<'static, str>,
    pub site: FailureSite,
}

impl ResultState {
    pub const INCONCLUSIVE: ResultState = ResultState::new(TestStatus::Inconclusive, "");
    pub const SKIPPED: ResultState = ResultState::new(TestStatus::Skipped, "");
    pub const IGNORED: ResultState = ResultState::new(TestStatus::Skipped, "Ignored");
    pub const EXPLICIT: ResultState = ResultState::new(TestStatus::Skipped, "Explicit");
    pub const SUCCESS: ResultState = ResultState::new(TestStatus::Passed, "");
    pub const FAILURE: ResultState = ResultState::new(TestStatus::Failed, "");
    pub const ERROR: ResultState = ResultState::new(TestStatus::Failed, "Error");
    pub const CANCELLED: ResultState = ResultState::new(TestStatus::Failed, "Cancelled");
    pub const NOT_RUNNABLE: ResultState = ResultState::new(TestStatus::Failed, "Invalid");
    pub const CHILD_FAILURE: ResultState =
        ResultState::at_site(TestStatus::Failed, "", FailureSite::Child);
    pub const SET_UP_FAILURE: ResultState =
        ResultState::at_site(TestStatus::Failed, "", FailureSite::SetUp);
    pub const SET_UP_ERROR: ResultState =
        ResultState::at_site(TestStatus::Failed, "Error", FailureSite::SetUp);
    pub const TEAR_DOWN_ERROR: ResultState =
        ResultState::at_site(TestStatus::Failed, "Error", FailureSite::TearDown);

    pub const fn new(status: TestStatus, label: &'static str) -> Self {
        Self::at_site(status, label, FailureSite::Test)
    }

    pub const fn at_site(status: TestStatus, label: &'static str, site: FailureSite) -> Self {
        Self {
            status,
            label: Cow::Borrowed(label),
            site,
        }
    }

    /// State with an arbitrary runtime label
    pub fn with_label(status: TestStatus, label: impl Into<String>) -> Self {
        Self {
            status,
            label: Cow::Owned(label.into()),
            site: FailureSite::Test,
        }
    }

    pub fn with_site(mut self, site: FailureSite) -> Self {
        self.site = site;
        self
    }

    /// Same status and label, regardless of site
    pub fn matches(&self, other: &ResultState) -> bool {
        self.status == other.status && self.label == other.label
    }
}

impl Default for ResultState {
    fn default() -> Self {
        ResultState::INCONCLUSIVE
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if !self.label.is_empty() {
            write!(f, ":{}", self.label)?;
        }
        if self.site != FailureSite::Test {
            write!(f, "({})", self.site)?;
        }
        Ok(())
    }
}

/// New suite state after folding one child, with the message to record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateChange {
    pub state: ResultState,
    pub message: Option<&'static str>,
}

/// Applies one child's outcome to the current suite state.
///
/// Returns `None` when the suite state is left untouched. Failure is sticky:
/// once the suite has failed no child can move it back to success or
/// ignored, and the first failure message is kept.
pub fn fold_child_state(current: &ResultState, child: &ResultState) -> Option<StateChange> {
    match child.status {
        TestStatus::Passed => {
            if current.status == TestStatus::Inconclusive {
                Some(StateChange {
                    state: ResultState::SUCCESS,
                    message: None,
                })
            } else {
                None
            }
        }
        TestStatus::Failed => {
            if current.status != TestStatus::Failed {
                Some(StateChange {
                    state: ResultState::CHILD_FAILURE,
                    message: Some(CHILD_ERRORS_MESSAGE),
                })
            } else {
                None
            }
        }
        TestStatus::Skipped => match child.label.as_ref() {
            "Invalid" => {
                if !current.matches(&ResultState::NOT_RUNNABLE)
                    && current.status != TestStatus::Failed
                {
                    Some(StateChange {
                        state: ResultState::CHILD_FAILURE,
                        message: Some(CHILD_ERRORS_MESSAGE),
                    })
                } else {
                    None
                }
            }
            "Ignored" => {
                if matches!(
                    current.status,
                    TestStatus::Inconclusive | TestStatus::Passed
                ) {
                    Some(StateChange {
                        state: ResultState::IGNORED.with_site(FailureSite::Child),
                        message: Some(CHILD_IGNORE_MESSAGE),
                    })
                } else {
                    None
                }
            }
            _ => None,
        },
        TestStatus::Inconclusive => None,
    }
}
