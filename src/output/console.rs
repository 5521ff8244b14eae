//! Console progress output
//!
//! Consumes progress reports as they arrive and writes test labels, test
//! output and a failure tally for each top-level suite.

use parking_lot::Mutex;
use std::io::Write;
use tracing::{info, warn};

use crate::events::{TestEvent, TestEventHandler};
use crate::models::TestStatus;

struct ConsoleState<W> {
    writer: W,
    /// Suite nesting depth; zero between top-level suites
    level: usize,
    run_count: usize,
    ignore_count: usize,
    failure_count: usize,
    messages: Vec<String>,
}

/// Prints progress reports to a writer
pub struct ConsoleEventHandler<W: Write + Send> {
    labels: bool,
    state: Mutex<ConsoleState<W>>,
}

impl<W: Write + Send> ConsoleEventHandler<W> {
    pub fn new(writer: W, labels: bool) -> Self {
        Self {
            labels,
            state: Mutex::new(ConsoleState {
                writer,
                level: 0,
                run_count: 0,
                ignore_count: 0,
                failure_count: 0,
                messages: Vec::new(),
            }),
        }
    }

    pub fn failure_count(&self) -> usize {
        self.state.lock().failure_count
    }

    pub fn run_count(&self) -> usize {
        self.state.lock().run_count
    }

    pub fn ignore_count(&self) -> usize {
        self.state.lock().ignore_count
    }

    pub fn into_writer(self) -> W {
        self.state.into_inner().writer
    }

    fn handle(&self, event: TestEvent) -> std::io::Result<()> {
        let mut state = self.state.lock();
        match event {
            TestEvent::StartTest { full_name, .. } => {
                if self.labels {
                    writeln!(state.writer, "***** {full_name}")?;
                }
            }
            TestEvent::StartSuite { full_name, .. } => {
                if state.level == 0 {
                    state.run_count = 0;
                    state.ignore_count = 0;
                    state.failure_count = 0;
                    state.messages.clear();
                    info!("Running tests in '{}'", full_name);
                }
                state.level += 1;
            }
            TestEvent::TestCase(report) => match report.result {
                TestStatus::Failed => {
                    state.run_count += 1;
                    state.failure_count += 1;
                    let line = format!(
                        "{}) {} : {}",
                        state.failure_count,
                        report.full_name,
                        report.message.as_deref().unwrap_or(&report.state_string())
                    );
                    state.messages.push(line);
                }
                TestStatus::Passed | TestStatus::Inconclusive => state.run_count += 1,
                TestStatus::Skipped => state.ignore_count += 1,
            },
            TestEvent::TestSuite(report) => {
                state.level = state.level.saturating_sub(1);
                if state.level == 0 {
                    let ConsoleState {
                        writer,
                        run_count,
                        ignore_count,
                        failure_count,
                        messages,
                        ..
                    } = &mut *state;

                    writeln!(
                        writer,
                        "{}: {} run, {} failed, {} not run ({:.3}s)",
                        report.full_name, run_count, failure_count, ignore_count, report.duration
                    )?;
                    for message in messages.iter() {
                        writeln!(writer, "  {message}")?;
                    }
                }
            }
            TestEvent::TestOutput { text, .. } => {
                write!(state.writer, "{text}")?;
                if !text.ends_with('\n') {
                    writeln!(state.writer)?;
                }
            }
        }
        state.writer.flush()
    }
}

impl<W: Write + Send> TestEventHandler for ConsoleEventHandler<W> {
    fn on_test_event(&self, report: &str) {
        match TestEvent::parse(report) {
            Ok(event) => {
                if let Err(e) = self.handle(event) {
                    warn!("Unable to write progress: {}", e);
                }
            }
            Err(e) => warn!("Ignoring malformed progress report: {}", e),
        }
    }
}
