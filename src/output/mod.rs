//! Output formatting module
//!
//! Provides result formats and live console progress.

mod console;
mod formatter;

pub use console::ConsoleEventHandler;
pub use formatter::{write_run_to_file, OutputFormat, ResultFormatter};
