//! Result ledger and report generation

mod render;

pub use render::{ReportGenerator, ReportHeader};

use crate::core::verify::{Status, Verdict};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One executed test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Test id
    pub id: String,
    /// Human description
    pub description: String,
    /// Folded verdict
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Known-flaky label, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_flaky: Option<String>,
    /// When the case finished
    pub timestamp: DateTime<Local>,
    /// Time spent on the case
    pub duration_ms: u64,
}

/// Append-only record of verdicts in execution order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultLedger {
    entries: Vec<LedgerEntry>,
}

impl ResultLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn record(&mut self, entry: LedgerEntry) {
        debug!(id = %entry.id, status = %entry.verdict.status, "verdict recorded");
        self.entries.push(entry);
    }

    /// Entries in execution order
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Entries with the given status, in execution order
    pub fn with_status(&self, status: Status) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |e| e.verdict.status == status)
    }

    /// Entries labeled known-flaky
    pub fn flaky(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(|e| e.known_flaky.is_some())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregate counts
    pub fn summary(&self) -> Summary {
        let count = |status| self.with_status(status).count();
        Summary {
            total: self.len(),
            passed: count(Status::Pass),
            failed: count(Status::Fail),
            warned: count(Status::Warn),
            timed_out: count(Status::Timeout),
            flaky: self.flaky().count(),
        }
    }
}

/// Aggregate statistics over a ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Executed cases
    pub total: usize,
    /// PASS count
    pub passed: usize,
    /// FAIL count
    pub failed: usize,
    /// WARN count
    pub warned: usize,
    /// TIMEOUT count
    pub timed_out: usize,
    /// Cases labeled known-flaky
    pub flaky: usize,
}

impl Summary {
    /// Share of `count` in the total, in percent. An empty ledger gives 0.
    pub fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * count as f64 / self.total as f64
    }

    /// Count for a status
    pub fn count(&self, status: Status) -> usize {
        match status {
            Status::Pass => self.passed,
            Status::Fail => self.failed,
            Status::Warn => self.warned,
            Status::Timeout => self.timed_out,
        }
    }

    /// Pass rate in percent
    pub fn pass_rate(&self) -> f64 {
        self.percent(self.passed)
    }

    /// True when no case failed or timed out
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.timed_out == 0
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tests: {} passed ({:.1}%), {} failed, {} warned, {} timed out",
            self.total,
            self.passed,
            self.pass_rate(),
            self.failed,
            self.warned,
            self.timed_out
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::verify::Category;

    pub(super) fn entry(id: &str, verdict: Verdict) -> LedgerEntry {
        LedgerEntry {
            id: id.to_string(),
            description: format!("{id} description"),
            verdict,
            known_flaky: None,
            timestamp: Local::now(),
            duration_ms: 12,
        }
    }

    #[test]
    fn test_empty_ledger_has_zero_rate() {
        let summary = ResultLedger::new().summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.pass_rate(), 0.0);
        assert_eq!(summary.percent(0), 0.0);
        assert!(summary.all_passed());
    }

    #[test]
    fn test_summary_counts_each_status() {
        let mut ledger = ResultLedger::new();
        ledger.record(entry("A", Verdict::pass("")));
        ledger.record(entry("B", Verdict::fail(Category::OutOfTolerance, "off")));
        ledger.record(entry("C", Verdict::warn(Category::MissingText, "meh")));
        let mut flaky = entry("D", Verdict::timeout("slow"));
        flaky.known_flaky = Some("start-value race".into());
        ledger.record(flaky);

        let summary = ledger.summary();
        assert_eq!((summary.passed, summary.failed, summary.warned, summary.timed_out), (1, 1, 1, 1));
        assert_eq!(summary.flaky, 1);
        assert_eq!(summary.pass_rate(), 25.0);
        assert!(!summary.all_passed());
        let ids: Vec<&str> = ledger.with_status(Status::Fail).map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["B"]);
    }
}
