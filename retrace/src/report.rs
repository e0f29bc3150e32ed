//! Run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

/// Summary of one playback run. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub script_id: Option<String>,
    pub total_steps: usize,
    pub succeeded_count: usize,
    /// `succeeded_count / total_steps`, or 0 for an empty script.
    pub success_rate: f64,
    pub duration_seconds: f64,
    pub log_lines: Vec<String>,
    /// The run was stopped before every step was attempted.
    pub stopped_early: bool,
    pub created_at: DateTime<Utc>,
    /// Diagnostic screenshots taken for failed steps.
    #[serde(default)]
    pub screenshots: Vec<PathBuf>,
}

impl RunReport {
    pub fn failed_count(&self) -> usize {
        self.log_lines
            .iter()
            .filter(|line| line.starts_with(FAILURE_MARK))
            .count()
    }

    /// Success rate as a percentage rounded to two decimals.
    pub fn success_percent(&self) -> f64 {
        (self.success_rate * 10_000.0).round() / 100.0
    }
}

const SUCCESS_MARK: &str = "[✓]";
const FAILURE_MARK: &str = "[✗]";

/// Collects per-step outcomes during a run.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    script_id: Option<String>,
    total: usize,
    succeeded: usize,
    attempted: usize,
    log_lines: Vec<String>,
    screenshots: Vec<PathBuf>,
}

impl ReportBuilder {
    pub fn new(script_id: Option<String>, total: usize) -> Self {
        Self {
            script_id,
            total,
            succeeded: 0,
            attempted: 0,
            log_lines: Vec::with_capacity(total),
            screenshots: Vec::new(),
        }
    }

    pub fn record_success(&mut self, index: usize, action: &str) {
        self.attempted += 1;
        self.succeeded += 1;
        self.log_lines.push(format!(
            "{SUCCESS_MARK} step {index}/{} succeeded: {action}",
            self.total
        ));
    }

    pub fn record_failure(&mut self, index: usize, error: &dyn Display, screenshot: Option<PathBuf>) {
        self.attempted += 1;
        self.log_lines.push(format!(
            "{FAILURE_MARK} step {index}/{} failed: {error}",
            self.total
        ));
        self.screenshots.extend(screenshot);
    }

    /// Steps that ran, successfully or not.
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn finish(self, duration: Duration, stopped: bool) -> RunReport {
        let success_rate = if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        };
        RunReport {
            script_id: self.script_id,
            total_steps: self.total,
            succeeded_count: self.succeeded,
            success_rate,
            duration_seconds: duration.as_secs_f64(),
            log_lines: self.log_lines,
            stopped_early: stopped && self.attempted < self.total,
            created_at: Utc::now(),
            screenshots: self.screenshots,
        }
    }
}
