//! Report rendering
//!
//! Rendering is a pure function of the header and the ledger. Only the
//! `Date:` and `Time:` lines carry wall-clock stamps.

use super::{ResultLedger, Summary};
use crate::core::verify::Status;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

const RULE_WIDTH: usize = 70;

/// Run metadata printed above the results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportHeader {
    /// Report title
    pub title: String,
    /// Firmware identifier under test
    pub firmware: String,
    /// Link description
    pub target: String,
    /// Suite name(s)
    pub suite: String,
    /// Unique run id
    pub run_id: Uuid,
    /// Run start
    pub started: DateTime<Local>,
    /// Free-form remarks (aborts, cancellation)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ReportHeader {
    /// Header for a run starting now
    pub fn new(title: impl Into<String>, firmware: impl Into<String>, target: impl Into<String>, suite: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            firmware: firmware.into(),
            target: target.into(),
            suite: suite.into(),
            run_id: Uuid::new_v4(),
            started: Local::now(),
            notes: Vec::new(),
        }
    }

    /// Add a remark
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    header: &'a ReportHeader,
    summary: Summary,
    results: &'a ResultLedger,
}

/// Renders a ledger as a plain-text or JSON report
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    header: ReportHeader,
}

impl ReportGenerator {
    /// Create a generator for one run
    pub fn new(header: ReportHeader) -> Self {
        Self { header }
    }

    /// Run metadata
    pub fn header(&self) -> &ReportHeader {
        &self.header
    }

    /// Mutable run metadata
    pub fn header_mut(&mut self) -> &mut ReportHeader {
        &mut self.header
    }

    /// Aggregate statistics
    pub fn summarize(&self, ledger: &ResultLedger) -> Summary {
        ledger.summary()
    }

    /// Plain-text report
    pub fn render(&self, ledger: &ResultLedger) -> String {
        let summary = ledger.summary();
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{}", self.header.title);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out);
        let _ = writeln!(out, "Date: {}", self.header.started.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "Firmware: {}", self.header.firmware);
        let _ = writeln!(out, "Target: {}", self.header.target);
        let _ = writeln!(out, "Suite: {}", self.header.suite);
        let _ = writeln!(out, "Run: {}", self.header.run_id);
        for note in &self.header.notes {
            let _ = writeln!(out, "Note: {note}");
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "STATISTICS:");
        let _ = writeln!(out, "  Total tests: {}", summary.total);
        for (label, status) in [
            ("Passed", Status::Pass),
            ("Failed", Status::Fail),
            ("Warned", Status::Warn),
            ("Timed out", Status::Timeout),
        ] {
            let n = summary.count(status);
            let _ = writeln!(out, "  {label}: {n} ({:.1}%)", summary.percent(n));
        }
        let _ = writeln!(out, "  Known flaky: {}", summary.flaky);
        let _ = writeln!(out);

        let problems: Vec<_> = ledger
            .entries()
            .iter()
            .filter(|e| matches!(e.verdict.status, Status::Fail | Status::Timeout))
            .collect();
        if !problems.is_empty() {
            let _ = writeln!(out, "FAILED TESTS:");
            for e in problems {
                let flaky = if e.known_flaky.is_some() { " (known flaky)" } else { "" };
                let _ = writeln!(
                    out,
                    "  - [{}] {}: {} {}{flaky}",
                    e.id, e.description, e.verdict.status, e.verdict.diagnostic
                );
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "DETAILED RESULTS:");
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        for e in ledger.entries() {
            let _ = writeln!(out, "[{}] {}", e.id, e.description);
            let _ = writeln!(out, "  Status: {}", e.verdict.status);
            if let Some(category) = e.verdict.category {
                let _ = writeln!(out, "  Category: {category}");
            }
            if !e.verdict.diagnostic.is_empty() {
                let _ = writeln!(out, "  Note: {}", e.verdict.diagnostic);
            }
            if let Some(reason) = &e.known_flaky {
                let _ = writeln!(out, "  Known flaky: {reason}");
            }
            let _ = writeln!(out, "  Time: {}", e.timestamp.format("%H:%M:%S"));
            let _ = writeln!(out);
        }

        out
    }

    /// JSON report with the same content
    pub fn render_json(&self, ledger: &ResultLedger) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&JsonReport {
            header: &self.header,
            summary: ledger.summary(),
            results: ledger,
        })
    }

    /// Write the plain-text report
    pub fn write(&self, ledger: &ResultLedger, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.render(ledger))?;
        info!(path = %path.display(), entries = ledger.len(), "report written");
        Ok(())
    }

    /// Write the JSON report
    pub fn write_json(&self, ledger: &ResultLedger, path: &Path) -> std::io::Result<()> {
        let json = self.render_json(ledger).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "json report written");
        Ok(())
    }
}
