//! Diagnostic sink injected into the ingest pipeline.
//!
//! The pipeline reports through this trait instead of assuming a process-wide subscriber, so a
//! pass can be driven in tests while capturing exactly what would have been logged.

use crate::parsers::{line_preview, LINE_PREVIEW_LIMIT};
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, warn};

pub trait Diagnostics: Send + Sync {
    /// A line did not match the grammar or carried an unconvertible field.
    fn malformed_line(&self, line: &str, reason: &str);

    /// The log file was absent when the pass started.
    fn log_missing(&self, path: &Path);

    /// A pass aborted with a fatal error.
    fn pass_failed(&self, err: &anyhow::Error);
}

/// Forwards every report to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn malformed_line(&self, line: &str, reason: &str) {
        warn!(
            reason,
            preview = %line_preview(line.as_bytes(), LINE_PREVIEW_LIMIT),
            "line does not match expected format"
        );
    }

    fn log_missing(&self, path: &Path) {
        error!(path = %path.display(), "log file does not exist");
    }

    fn pass_failed(&self, err: &anyhow::Error) {
        error!(error = %format!("{err:#}"), "ingest pass failed");
    }
}

/// A single captured report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    MalformedLine { line: String, reason: String },
    LogMissing(String),
    PassFailed(String),
}

/// Keeps reports in memory; handy for assertions and for callers that want a pass transcript.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    reports: Mutex<Vec<Report>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }

    pub fn malformed_count(&self) -> usize {
        self.reports()
            .iter()
            .filter(|report| matches!(report, Report::MalformedLine { .. }))
            .count()
    }

    fn push(&self, report: Report) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn malformed_line(&self, line: &str, reason: &str) {
        self.push(Report::MalformedLine {
            line: line.to_string(),
            reason: reason.to_string(),
        });
    }

    fn log_missing(&self, path: &Path) {
        self.push(Report::LogMissing(path.display().to_string()));
    }

    fn pass_failed(&self, err: &anyhow::Error) {
        self.push(Report::PassFailed(format!("{err:#}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn recording_diagnostics_keeps_reports_in_order() {
        let diagnostics = RecordingDiagnostics::new();
        diagnostics.malformed_line("garbage", "no match");
        diagnostics.log_missing(Path::new("/var/log/access.log"));
        diagnostics.pass_failed(&anyhow!("disk full").context("failed to write cursor"));

        assert_eq!(
            diagnostics.reports(),
            vec![
                Report::MalformedLine {
                    line: "garbage".to_string(),
                    reason: "no match".to_string(),
                },
                Report::LogMissing("/var/log/access.log".to_string()),
                Report::PassFailed("failed to write cursor: disk full".to_string()),
            ]
        );
        assert_eq!(diagnostics.malformed_count(), 1);
    }
}
