//! Test execution engine
//!
//! Provides the worker pool and the runner driving whole test runs.

mod parallel;
mod runner;

pub use parallel::{ParallelWorkerPool, PoolError, TestExecutionTask};
pub use runner::{RunSettings, TestRunner};
