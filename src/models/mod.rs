//! Data models for test execution
//!
//! Test tree nodes, result states, failures and results.

mod failure;
mod report;
mod result_state;
mod test_node;
mod test_result;

pub use failure::TestFailure;
pub use report::ResultReport;
pub use result_state::{
    fold_child_state, FailureSite, ResultState, StateChange, TestStatus, CHILD_ERRORS_MESSAGE,
    CHILD_IGNORE_MESSAGE,
};
pub use test_node::{
    property_names, ApartmentState, FixtureHooks, PropertyBag, RunState, TestBuilder, TestFn,
    TestNode, TEST_CASE_TYPE,
};
pub use test_result::{TestResult, MIN_DURATION};
