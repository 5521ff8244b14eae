//! Work item execution
//!
//! Turns a test tree into results. Each node gets a `WorkItem`; suites fan
//! their children out through a `WorkItemDispatcher` and fold the results
//! back in, leaves run their body between the fixture's per-test hooks.

mod composite;
mod context;
mod dispatcher;
mod listener;
mod simple;
mod work_item;

pub use composite::PARENT_SETUP_FAILED_MESSAGE;
pub use context::ExecutionContext;
pub use dispatcher::{ParallelWorkItemDispatcher, SimpleWorkItemDispatcher, WorkItemDispatcher};
pub use listener::{NullListener, TestListener};
pub use work_item::{Completion, CompletionHandler, WorkItem, WorkItemState};
