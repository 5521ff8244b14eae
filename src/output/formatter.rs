//! Output formatters for test results
//!
//! Provides table, JSON, CSV and summary output formats.

#![allow(dead_code)]

use anyhow::{Context, Result};
use std::io::Write;
use std::time::Duration;

use crate::models::{ResultReport, TestStatus};
use crate::results::RunSummary;
use crate::utils::format_duration;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a finished run
    pub fn format_run(&self, report: &ResultReport) -> Result<String> {
        Ok(match self.format {
            OutputFormat::Table => self.format_run_table(report),
            OutputFormat::Json => serde_json::to_string(report)?,
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report)?,
            OutputFormat::Csv => self.format_run_csv(report)?,
            OutputFormat::Summary => self.format_summary_brief(&RunSummary::from_report(report)),
        })
    }

    fn status_str(&self, report: &ResultReport) -> String {
        let text = format!("{} {}", report.result.symbol(), report.state_string());
        if !self.colorize {
            return text;
        }
        let color = match report.result {
            TestStatus::Passed => "32",
            TestStatus::Failed => "31",
            TestStatus::Skipped => "33",
            TestStatus::Inconclusive => "36",
        };
        format!("\x1b[{color}m{text}\x1b[0m")
    }

    /// One line for a test or suite, indented by depth
    pub fn format_line(&self, report: &ResultReport, depth: usize) -> String {
        let name = format!("{}{}", "  ".repeat(depth), report.name);
        format!(
            "{:40} {} [{}]",
            name,
            self.status_str(report),
            format_duration(Duration::from_secs_f64(report.duration.max(0.0)))
        )
    }

    fn format_run_table(&self, report: &ResultReport) -> String {
        let mut output = String::new();
        let summary = RunSummary::from_report(report);

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!("║  {:60}║\n", truncate(&report.full_name, 60)));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        self.push_tree(&mut output, report, 0);

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "║  Tests: {} | Passed: {} | Failed: {} | Errors: {} | Invalid: {}\n",
            summary.test_count, summary.passed, summary.failures, summary.errors, summary.invalid
        ));
        output.push_str(&format!(
            "║  Inconclusive: {} | Skipped: {} | Ignored: {} | Explicit: {}\n",
            summary.inconclusive, summary.skipped, summary.ignored, summary.explicit
        ));
        output.push_str(&format!(
            "║  Result: {} | Asserts: {} | Duration: {}\n",
            summary.result,
            summary.asserts,
            format_duration(Duration::from_secs_f64(summary.duration.max(0.0)))
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        let failures: Vec<_> = report
            .test_cases()
            .filter(|r| r.result == TestStatus::Failed)
            .collect();
        if !failures.is_empty() {
            output.push_str("\n Failures:\n");
            for (i, failure) in failures.iter().enumerate() {
                output.push_str(&format!(
                    " {}) {} : {}\n",
                    i + 1,
                    failure.full_name,
                    failure.message.as_deref().unwrap_or(&failure.state_string())
                ));
                if let Some(trace) = &failure.stack_trace {
                    for line in trace.lines() {
                        output.push_str(&format!("      {line}\n"));
                    }
                }
            }
        }

        output
    }

    fn push_tree(&self, output: &mut String, report: &ResultReport, depth: usize) {
        output.push_str(&format!("║  {}\n", self.format_line(report, depth)));
        for child in &report.children {
            self.push_tree(output, child, depth + 1);
        }
    }

    fn format_run_csv(&self, report: &ResultReport) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "id",
            "full_name",
            "result",
            "label",
            "site",
            "duration_ms",
            "asserts",
            "message",
        ])?;

        for case in report.test_cases() {
            writer.write_record([
                case.id.clone(),
                case.full_name.clone(),
                case.result.to_string(),
                case.label.clone(),
                case.site.to_string(),
                case.duration_ms().to_string(),
                case.asserts.to_string(),
                case.message.clone().unwrap_or_default(),
            ])?;
        }

        let bytes = writer.into_inner().context("Failed to flush CSV output")?;
        String::from_utf8(bytes).context("CSV output was not UTF-8")
    }

    fn format_summary_brief(&self, summary: &RunSummary) -> String {
        format!(
            "{}: {} - {} tests, {} passed, {} failed, {} skipped in {}",
            summary.name,
            summary.result,
            summary.test_count,
            summary.passed,
            summary.failed_count(),
            summary.not_run_count(),
            format_duration(Duration::from_secs_f64(summary.duration.max(0.0)))
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let kept: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

/// Write a run to a file
pub fn write_run_to_file(path: &str, report: &ResultReport, format: OutputFormat) -> Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_run(report)?;

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
