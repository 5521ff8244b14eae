//! Timer utilities
//!
//! Timing of run phases and human-readable durations.

#![allow(dead_code)]

use std::time::{Duration, Instant};

/// Measures one labelled span of work
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer, log and return elapsed time
    pub fn stop(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::debug!("{} took {}", self.label, format_duration(elapsed));
        elapsed
    }
}

/// Splits a command into consecutive named phases
#[derive(Debug)]
pub struct PhaseTimer {
    start: Instant,
    last: Instant,
    phases: Vec<(String, Duration)>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            phases: Vec::new(),
        }
    }

    /// Ends the current phase under `name` and starts the next one
    pub fn mark(&mut self, name: impl Into<String>) -> Duration {
        let now = Instant::now();
        let took = now - self.last;
        self.last = now;
        self.phases.push((name.into(), took));
        took
    }

    pub fn phases(&self) -> &[(String, Duration)] {
        &self.phases
    }

    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    /// "load 3ms, execute 1.20s (total 1.21s)"
    pub fn summary(&self) -> String {
        let phases: Vec<String> = self
            .phases
            .iter()
            .map(|(name, took)| format!("{name} {}", format_duration(*took)))
            .collect();
        format!("{} (total {})", phases.join(", "), format_duration(self.total()))
    }
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a duration at a sensible scale: 850µs, 12ms, 1.50s, 2m 03s
pub fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    if micros < 1_000 {
        format!("{micros}µs")
    } else if micros < 1_000_000 {
        format!("{}ms", duration.as_millis())
    } else if duration.as_secs() < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}
