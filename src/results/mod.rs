//! Results storage and summaries
//!
//! Provides run summaries, aggregation across root suites and persistent
//! storage for finished runs.

#![allow(dead_code)]

mod storage;
mod summary;

pub use storage::{ResultsStorage, RunInfo, StoredRun, StoredSettings};
pub use summary::{aggregate, RunSummary, TEST_RUN_TYPE};
