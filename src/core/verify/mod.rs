//! Response verification
//!
//! Turns raw response windows into verdicts. Every check is total: missing
//! data, malformed values, bad patterns and zero denominators all become FAIL
//! verdicts with a category and a diagnostic, never a panic.

mod template;
mod tolerance;

pub use template::{ExtractionError, Sample, Template};
pub use tolerance::Tolerance;

use crate::core::collector::ResponseWindow;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Outcome of a check or test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Check satisfied
    Pass,
    /// Check violated
    Fail,
    /// Advisory check violated
    Warn,
    /// The device did not answer in time
    Timeout,
}

impl Status {
    /// Ordering used when folding: higher is worse
    pub fn severity(self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::Warn => 1,
            Self::Fail => 2,
            Self::Timeout => 3,
        }
    }

    /// Report label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Warn => "WARN",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// All statuses, in report order
    pub fn all() -> &'static [Status] {
        &[Status::Pass, Status::Fail, Status::Warn, Status::Timeout]
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a check did not pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Expected text absent, or forbidden text present
    MissingText,
    /// No line matched a pattern
    PatternMismatch,
    /// No line conforms to a value template
    TemplateMismatch,
    /// A conforming line carries an unparsable value
    Malformed,
    /// Value outside its tolerance band
    OutOfTolerance,
    /// Relation between captured values does not hold
    RelationFailed,
    /// The device was not in the state the case assumes
    Precondition,
    /// No complete response in time
    Timeout,
    /// Link failure
    Transport,
    /// The check itself is unusable (bad regex, wrong operand count)
    InvalidCheck,
}

impl Category {
    /// Report label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingText => "missing-text",
            Self::PatternMismatch => "pattern-mismatch",
            Self::TemplateMismatch => "template-mismatch",
            Self::Malformed => "malformed",
            Self::OutOfTolerance => "out-of-tolerance",
            Self::RelationFailed => "relation-failed",
            Self::Precondition => "precondition",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::InvalidCheck => "invalid-check",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ExtractionError> for Category {
    fn from(err: &ExtractionError) -> Self {
        match err {
            ExtractionError::NoData { .. } => Self::TemplateMismatch,
            ExtractionError::Malformed { .. } => Self::Malformed,
            ExtractionError::InvalidPattern { .. } => Self::InvalidCheck,
        }
    }
}

/// Status plus diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Outcome
    pub status: Status,
    /// Failure category, absent on PASS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// Human-readable explanation
    pub diagnostic: String,
}

impl Verdict {
    /// Passing verdict
    pub fn pass(diagnostic: impl Into<String>) -> Self {
        Self {
            status: Status::Pass,
            category: None,
            diagnostic: diagnostic.into(),
        }
    }

    /// Failing verdict
    pub fn fail(category: Category, diagnostic: impl Into<String>) -> Self {
        Self {
            status: Status::Fail,
            category: Some(category),
            diagnostic: diagnostic.into(),
        }
    }

    /// Warning verdict
    pub fn warn(category: Category, diagnostic: impl Into<String>) -> Self {
        Self {
            status: Status::Warn,
            category: Some(category),
            diagnostic: diagnostic.into(),
        }
    }

    /// Timeout verdict
    pub fn timeout(diagnostic: impl Into<String>) -> Self {
        Self {
            status: Status::Timeout,
            category: Some(Category::Timeout),
            diagnostic: diagnostic.into(),
        }
    }

    /// Verdict for a failed extraction
    pub fn from_extraction(err: &ExtractionError) -> Self {
        Self::fail(Category::from(err), err.to_string())
    }

    /// True for PASS
    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }

    /// Downgrade a wrong value to WARN. Missing or unreadable data and
    /// broken checks stay FAIL.
    #[must_use]
    pub fn advisory(mut self) -> Self {
        let no_data = matches!(
            self.category,
            Some(Category::TemplateMismatch | Category::Malformed | Category::InvalidCheck)
        );
        if self.status == Status::Fail && !no_data {
            self.status = Status::Warn;
        }
        self
    }

    /// Prefix the diagnostic with a label
    #[must_use]
    pub fn labeled(mut self, label: &str) -> Self {
        if !label.is_empty() {
            self.diagnostic = if self.diagnostic.is_empty() {
                label.to_string()
            } else {
                format!("{label}: {}", self.diagnostic)
            };
        }
        self
    }

    /// Fold sub-verdicts into one: the worst status wins, the category is the
    /// first one at that status, and diagnostics are joined with `; `.
    /// Folding nothing yields PASS.
    pub fn fold<I>(verdicts: I) -> Self
    where
        I: IntoIterator<Item = Verdict>,
    {
        let verdicts: Vec<Verdict> = verdicts.into_iter().collect();
        let worst = verdicts
            .iter()
            .map(|v| v.status)
            .max_by_key(|s| s.severity())
            .unwrap_or(Status::Pass);
        let category = verdicts
            .iter()
            .find(|v| v.status == worst)
            .and_then(|v| v.category);
        let diagnostic = verdicts
            .iter()
            .map(|v| v.diagnostic.as_str())
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            status: worst,
            category,
            diagnostic,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            Some(c) => write!(f, "{} [{}] {}", self.status, c, self.diagnostic),
            None => write!(f, "{} {}", self.status, self.diagnostic),
        }
    }
}

/// What a single response window must show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expect", rename_all = "snake_case")]
pub enum Expectation {
    /// The window text contains `text` verbatim
    Contains {
        /// Required text
        text: String,
    },
    /// Some line, or the whole window, matches `pattern`
    MatchesPattern {
        /// Regular expression
        pattern: String,
    },
    /// A templated value lies within `tolerance` of `expected`
    NumericWithinTolerance {
        /// Where the value comes from
        template: Template,
        /// Target value
        expected: f64,
        /// Accepted deviation
        tolerance: Tolerance,
    },
    /// The window is non-empty and does not contain `text`
    Absent {
        /// Forbidden text
        text: String,
    },
    /// At least one line contains every token
    AnyLineContainsAll {
        /// Tokens that must share a line
        tokens: Vec<String>,
    },
    /// The window is non-empty and no line contains every token
    NoLineContainsAll {
        /// Tokens that must not share a line
        tokens: Vec<String>,
    },
}

impl Expectation {
    /// `Contains`
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains { text: text.into() }
    }

    /// `MatchesPattern`
    pub fn matches(pattern: impl Into<String>) -> Self {
        Self::MatchesPattern {
            pattern: pattern.into(),
        }
    }

    /// `NumericWithinTolerance`
    pub fn numeric(template: Template, expected: f64, tolerance: Tolerance) -> Self {
        Self::NumericWithinTolerance {
            template,
            expected,
            tolerance,
        }
    }

    /// `Absent`
    pub fn absent(text: impl Into<String>) -> Self {
        Self::Absent { text: text.into() }
    }

    /// `AnyLineContainsAll`
    pub fn line_with_all<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyLineContainsAll {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// `NoLineContainsAll`
    pub fn no_line_with_all<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::NoLineContainsAll {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

/// Evaluate one expectation against one window
pub fn evaluate(window: &ResponseWindow, expectation: &Expectation) -> Verdict {
    match expectation {
        Expectation::Contains { text } => {
            if window.is_empty() {
                Verdict::fail(Category::MissingText, format!("no response (expected '{text}')"))
            } else if window.text().contains(text.as_str()) {
                Verdict::pass(format!("found '{text}'"))
            } else {
                Verdict::fail(
                    Category::MissingText,
                    format!("'{text}' not found in {} lines", window.len()),
                )
            }
        }
        Expectation::MatchesPattern { pattern } => {
            let re = match Regex::new(pattern) {
                Ok(re) => re,
                Err(e) => return Verdict::fail(Category::InvalidCheck, format!("bad pattern '{pattern}': {e}")),
            };
            if window.texts().any(|l| re.is_match(l)) || re.is_match(&window.text()) {
                Verdict::pass(format!("matched /{pattern}/"))
            } else if window.is_empty() {
                Verdict::fail(Category::PatternMismatch, format!("no response (expected /{pattern}/)"))
            } else {
                Verdict::fail(
                    Category::PatternMismatch,
                    format!("/{pattern}/ matched none of {} lines", window.len()),
                )
            }
        }
        Expectation::NumericWithinTolerance {
            template,
            expected,
            tolerance,
        } => match template.extract(window) {
            Ok(sample) => check_value(sample.value, *expected, *tolerance),
            Err(e) => Verdict::from_extraction(&e),
        },
        Expectation::Absent { text } => {
            if window.is_empty() {
                Verdict::fail(
                    Category::MissingText,
                    format!("no response to verify absence of '{text}' against"),
                )
            } else if window.text().contains(text.as_str()) {
                Verdict::fail(Category::MissingText, format!("unexpected '{text}' present"))
            } else {
                Verdict::pass(format!("'{text}' absent"))
            }
        }
        Expectation::AnyLineContainsAll { tokens } => {
            let hit = window
                .texts()
                .any(|line| tokens.iter().all(|t| line.contains(t.as_str())));
            if hit {
                Verdict::pass(format!("line with {} found", tokens.join(" + ")))
            } else {
                Verdict::fail(
                    Category::MissingText,
                    format!("no line contains all of {}", tokens.join(" + ")),
                )
            }
        }
        Expectation::NoLineContainsAll { tokens } => {
            let joined = tokens.join(" + ");
            if window.is_empty() {
                Verdict::fail(Category::MissingText, format!("no response to check {joined} against"))
            } else if let Some(line) = window
                .texts()
                .find(|line| tokens.iter().all(|t| line.contains(t.as_str())))
            {
                Verdict::fail(Category::MissingText, format!("unexpected line '{line}'"))
            } else {
                Verdict::pass(format!("no line with {joined}"))
            }
        }
    }
}

fn check_value(actual: f64, expected: f64, tolerance: Tolerance) -> Verdict {
    if tolerance.accepts(expected, actual) {
        Verdict::pass(format!("{actual} within {expected} {tolerance}"))
    } else {
        Verdict::fail(
            Category::OutOfTolerance,
            format!(
                "{actual} outside {expected} {tolerance} (off by {})",
                (actual - expected).abs()
            ),
        )
    }
}

/// Relation between values captured from different windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "relation", rename_all = "snake_case")]
pub enum Relation {
    /// first < second
    LessThan,
    /// first > second
    GreaterThan,
    /// first == second
    Equal,
    /// first != second
    NotEqual,
    /// first lies within `tolerance` of second
    Within {
        /// Accepted deviation
        tolerance: Tolerance,
    },
    /// first / second lies within `tolerance` of `expected`
    RatioWithin {
        /// Target ratio
        expected: f64,
        /// Accepted deviation
        tolerance: Tolerance,
    },
    /// (second - first) per second of arrival time lies within `tolerance` of `expected`
    RateWithin {
        /// Target rate per second
        expected: f64,
        /// Accepted deviation
        tolerance: Tolerance,
    },
    /// The series takes at least two distinct values
    Toggles,
}

impl Relation {
    fn arity(&self) -> Option<usize> {
        match self {
            Self::Toggles => None,
            _ => Some(2),
        }
    }
}

/// Evaluate a relation over captured samples, in capture order
pub fn relate(relation: &Relation, samples: &[Sample]) -> Verdict {
    if let Some(n) = relation.arity() {
        if samples.len() != n {
            return Verdict::fail(
                Category::InvalidCheck,
                format!("{relation:?} needs {n} values, got {}", samples.len()),
            );
        }
    }

    let ordered = |ok: bool, op: &str, a: f64, b: f64| {
        if ok {
            Verdict::pass(format!("{a} {op} {b}"))
        } else {
            Verdict::fail(Category::RelationFailed, format!("expected {a} {op} {b}"))
        }
    };

    match relation {
        Relation::LessThan => ordered(samples[0].value < samples[1].value, "<", samples[0].value, samples[1].value),
        Relation::GreaterThan => ordered(samples[0].value > samples[1].value, ">", samples[0].value, samples[1].value),
        Relation::Equal => ordered(samples[0].value == samples[1].value, "==", samples[0].value, samples[1].value),
        Relation::NotEqual => ordered(samples[0].value != samples[1].value, "!=", samples[0].value, samples[1].value),
        Relation::Within { tolerance } => {
            relation_value(samples[0].value, samples[1].value, *tolerance, "difference")
        }
        Relation::RatioWithin { expected, tolerance } => {
            let (num, den) = (samples[0].value, samples[1].value);
            if den == 0.0 {
                return Verdict::fail(Category::RelationFailed, format!("zero denominator ({num}/0)"));
            }
            relation_value(num / den, *expected, *tolerance, "ratio")
        }
        Relation::RateWithin { expected, tolerance } => {
            let (first, second) = (&samples[0], &samples[1]);
            let secs = second
                .received_at
                .checked_duration_since(first.received_at)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            if secs <= 0.0 {
                return Verdict::fail(Category::RelationFailed, "no elapsed time between samples".to_string());
            }
            let rate = (second.value - first.value) / secs;
            relation_value(rate.round(), *expected, *tolerance, "rate/s")
        }
        Relation::Toggles => {
            let distinct: HashSet<u64> = samples.iter().map(|s| s.value.to_bits()).collect();
            if distinct.len() >= 2 {
                Verdict::pass(format!("{} distinct values over {} samples", distinct.len(), samples.len()))
            } else {
                Verdict::fail(
                    Category::RelationFailed,
                    format!("no toggle over {} samples", samples.len()),
                )
            }
        }
    }
}

fn relation_value(actual: f64, expected: f64, tolerance: Tolerance, what: &str) -> Verdict {
    if tolerance.accepts(expected, actual) {
        Verdict::pass(format!("{what} {actual} within {expected} {tolerance}"))
    } else {
        Verdict::fail(
            Category::RelationFailed,
            format!("{what} {actual} outside {expected} {tolerance}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sample(value: f64) -> Sample {
        Sample {
            value,
            line: value.to_string(),
            received_at: Instant::now(),
        }
    }

    fn reg(value: i64) -> ResponseWindow {
        ResponseWindow::from_text([format!("Reg[10]: {value}")])
    }

    #[test]
    fn test_absolute_tolerance_property() {
        let exp = Expectation::numeric(Template::register(10), 5000.0, Tolerance::Absolute(100.0));
        for actual in [4900, 5000, 5100] {
            assert_eq!(evaluate(&reg(actual), &exp).status, Status::Pass, "{actual}");
        }
        let verdict = evaluate(&reg(4700), &exp);
        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.category, Some(Category::OutOfTolerance));
    }

    #[test]
    fn test_percentage_tolerance_property() {
        let exp = Expectation::numeric(Template::register(10), 1000.0, Tolerance::Percentage(0.05));
        assert!(evaluate(&reg(1020), &exp).passed());
        assert!(!evaluate(&reg(1200), &exp).passed());
    }

    #[test]
    fn test_missing_field_is_no_data_fail() {
        let exp = Expectation::numeric(Template::register(10), 1.0, Tolerance::Absolute(0.0));
        let verdict = evaluate(&ResponseWindow::from_text(["[ERROR] Unknown command"]), &exp);
        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.category, Some(Category::TemplateMismatch));
        assert!(verdict.diagnostic.starts_with("no data"));
    }

    #[test]
    fn test_prescaler_ratio_property() {
        let ratio = Relation::RatioWithin {
            expected: 4.0,
            tolerance: Tolerance::Absolute(0.5),
        };
        assert!(relate(&ratio, &[sample(4000.0), sample(1000.0)]).passed());
        assert!(!relate(&ratio, &[sample(1000.0), sample(1000.0)]).passed());

        let zero = relate(&ratio, &[sample(4000.0), sample(0.0)]);
        assert_eq!(zero.status, Status::Fail);
        assert!(zero.diagnostic.contains("zero denominator"));
    }

    #[test]
    fn test_rate_uses_arrival_times() {
        let t0 = Instant::now();
        let first = Sample {
            value: 100.0,
            line: String::new(),
            received_at: t0,
        };
        let second = Sample {
            value: 2100.0,
            line: String::new(),
            received_at: t0 + Duration::from_secs(2),
        };
        let rate = Relation::RateWithin {
            expected: 1000.0,
            tolerance: Tolerance::Percentage(0.05),
        };
        assert!(relate(&rate, &[first.clone(), second.clone()]).passed());
        assert!(!relate(&rate, &[second, first]).passed());
    }

    #[test]
    fn test_ordering_relations_and_arity() {
        assert!(relate(&Relation::LessThan, &[sample(9000.0), sample(10000.0)]).passed());
        assert!(!relate(&Relation::GreaterThan, &[sample(1.0), sample(1.0)]).passed());
        assert!(relate(&Relation::NotEqual, &[sample(1.0), sample(0.0)]).passed());
        let bad = relate(&Relation::Equal, &[sample(1.0)]);
        assert_eq!(bad.category, Some(Category::InvalidCheck));
        assert!(relate(&Relation::Toggles, &[sample(0.0), sample(0.0), sample(1.0)]).passed());
        assert!(!relate(&Relation::Toggles, &[sample(1.0), sample(1.0)]).passed());
    }

    #[test]
    fn test_text_expectations() {
        let window = ResponseWindow::from_text(["=== GPIO MAPPING ===", "GPIO 21: COIL:100 (static)"]);
        assert!(evaluate(&window, &Expectation::contains("GPIO MAPPING")).passed());
        assert!(evaluate(&window, &Expectation::matches(r"GPIO \d+:")).passed());
        assert!(evaluate(&window, &Expectation::line_with_all(["GPIO 21", "COIL:100"])).passed());
        assert!(!evaluate(&window, &Expectation::line_with_all(["GPIO 2", "HEARTBEAT"])).passed());
        assert!(!evaluate(&window, &Expectation::absent("GPIO 21")).passed());
        assert!(evaluate(&window, &Expectation::absent("GPIO 22")).passed());

        let empty = ResponseWindow::default();
        assert!(!evaluate(&empty, &Expectation::absent("GPIO 21")).passed());
        assert_eq!(
            evaluate(&empty, &Expectation::matches("(")).category,
            Some(Category::InvalidCheck)
        );
    }

    #[test]
    fn test_removed_mapping_ignores_other_uses_of_the_pin() {
        let unmapped = Expectation::no_line_with_all(["GPIO 21", "COIL:100"]);

        let as_input = ResponseWindow::from_text(["=== GPIO MAPPING ===", "GPIO 21: INPUT:5 (static)"]);
        assert!(evaluate(&as_input, &unmapped).passed());
        assert!(!evaluate(&as_input, &Expectation::absent("GPIO 21")).passed());

        let still_mapped = ResponseWindow::from_text(["GPIO 21: COIL:100 (static)"]);
        let verdict = evaluate(&still_mapped, &unmapped);
        assert_eq!(verdict.status, Status::Fail);
        assert!(verdict.diagnostic.contains("GPIO 21: COIL:100"), "{verdict}");

        assert_eq!(evaluate(&ResponseWindow::default(), &unmapped).status, Status::Fail);
    }

    #[test]
    fn test_fold_worst_wins() {
        let folded = Verdict::fold([
            Verdict::pass("a"),
            Verdict::warn(Category::MissingText, "b"),
            Verdict::fail(Category::OutOfTolerance, "c"),
        ]);
        assert_eq!(folded.status, Status::Fail);
        assert_eq!(folded.category, Some(Category::OutOfTolerance));
        assert_eq!(folded.diagnostic, "a; b; c");

        let with_timeout = Verdict::fold([Verdict::fail(Category::MissingText, "x"), Verdict::timeout("y")]);
        assert_eq!(with_timeout.status, Status::Timeout);
        assert_eq!(Verdict::fold(Vec::new()).status, Status::Pass);
        assert_eq!(Verdict::fail(Category::MissingText, "z").advisory().status, Status::Warn);
    }

    #[test]
    fn test_advisory_keeps_missing_data_failing() {
        let restored = Expectation::numeric(Template::register(100), 54321.0, Tolerance::Absolute(0.0));

        let wrong = ResponseWindow::from_text(["Reg[100]: 99999"]);
        let verdict = evaluate(&wrong, &restored).advisory();
        assert_eq!(verdict.status, Status::Warn);
        assert_eq!(verdict.category, Some(Category::OutOfTolerance));

        let no_value = ResponseWindow::from_text(["Config loaded"]);
        let verdict = evaluate(&no_value, &restored).advisory();
        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.category, Some(Category::TemplateMismatch));

        let garbled = ResponseWindow::from_text(["Reg[100]: 5x321"]);
        assert_eq!(evaluate(&garbled, &restored).advisory().status, Status::Fail);
        assert_eq!(
            evaluate(&no_value, &Expectation::matches("(")).advisory().status,
            Status::Fail
        );
    }

    #[test]
    fn test_expectation_from_yaml() {
        let exp: Expectation = serde_yaml::from_str(
            "expect: numeric_within_tolerance\ntemplate: { kind: register, addr: 100 }\nexpected: 5000\ntolerance: { kind: absolute, value: 100 }\n",
        )
        .unwrap();
        assert_eq!(exp, Expectation::numeric(Template::register(100), 5000.0, Tolerance::Absolute(100.0)));

        let exp: Expectation = serde_yaml::from_str("expect: no_line_contains_all\ntokens: [GPIO 21, COIL:100]\n").unwrap();
        assert_eq!(exp, Expectation::no_line_with_all(["GPIO 21", "COIL:100"]));
    }
}
