//! Test cases and suites
//!
//! A [`TestCase`] is an ordered list of steps against one shared device:
//! send commands, wait for physical time to pass, check the latest response,
//! capture templated values and relate captured values to each other. Cases
//! declare the device state they assume as preconditions, checked before any
//! step runs.

mod file;
mod runner;

pub use file::{load_suite, SuiteFileError};
pub use runner::{CaseReport, RunOutcome, SuiteRunner};

use crate::core::dispatcher::Command;
use crate::core::verify::{Expectation, Relation, Template};
use crate::utils::duration::millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One step of a test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Dispatch a command; its response becomes the current window
    Send {
        /// Command to dispatch
        command: Command,
    },
    /// Let physical time pass (pulses accumulate, timers toggle)
    Delay {
        /// Observation window
        #[serde(rename = "ms", with = "millis")]
        duration: Duration,
    },
    /// Check the current window
    Expect {
        /// Check to apply
        check: Expectation,
        /// FAIL is reported as WARN
        #[serde(default)]
        advisory: bool,
        /// Prefix for the diagnostic
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Capture a templated value from the current window under `label`
    Probe {
        /// Name the value is stored under
        label: String,
        /// Where the value comes from
        template: Template,
    },
    /// Check a relation between captured values, in the given order
    Relate {
        /// Relation to check
        relation: Relation,
        /// Labels of previously probed values
        operands: Vec<String>,
        /// FAIL is reported as WARN
        #[serde(default)]
        advisory: bool,
    },
}

/// Device state a test case assumes before it starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precondition {
    /// What is assumed, in words
    pub description: String,
    /// Command whose response shows the state
    pub command: Command,
    /// What that response must show
    pub check: Expectation,
}

impl Precondition {
    /// Create a precondition
    pub fn new(description: impl Into<String>, command: Command, check: Expectation) -> Self {
        Self {
            description: description.into(),
            command,
            check,
        }
    }
}

/// A named, ordered sequence of steps folded into one verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Stable identifier (e.g. `CNT-HW-05`)
    pub id: String,
    /// Human description
    pub description: String,
    /// Assumed device state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<Precondition>,
    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Known-flaky label; the verdict is kept, only annotated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_flaky: Option<String>,
}

impl TestCase {
    /// Start building a test case
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            preconditions: Vec::new(),
            steps: Vec::new(),
            known_flaky: None,
        }
    }

    /// Add a precondition
    #[must_use]
    pub fn precondition(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Send a command
    #[must_use]
    pub fn send(mut self, text: impl Into<String>, wait: Duration) -> Self {
        self.steps.push(Step::Send {
            command: Command::new(text, wait),
        });
        self
    }

    /// Send a prepared command
    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.steps.push(Step::Send { command });
        self
    }

    /// Wait without talking to the device
    #[must_use]
    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Delay { duration });
        self
    }

    /// Check the latest response
    #[must_use]
    pub fn expect(mut self, check: Expectation) -> Self {
        self.steps.push(Step::Expect {
            check,
            advisory: false,
            label: None,
        });
        self
    }

    /// Check the latest response, prefixing the diagnostic with `label`
    #[must_use]
    pub fn expect_labeled(mut self, label: impl Into<String>, check: Expectation) -> Self {
        self.steps.push(Step::Expect {
            check,
            advisory: false,
            label: Some(label.into()),
        });
        self
    }

    /// Check the latest response; a violation only warns
    #[must_use]
    pub fn advise(mut self, label: impl Into<String>, check: Expectation) -> Self {
        self.steps.push(Step::Expect {
            check,
            advisory: true,
            label: Some(label.into()),
        });
        self
    }

    /// Capture a value from the latest response
    #[must_use]
    pub fn probe(mut self, label: impl Into<String>, template: Template) -> Self {
        self.steps.push(Step::Probe {
            label: label.into(),
            template,
        });
        self
    }

    /// Relate captured values
    #[must_use]
    pub fn relate<I, S>(mut self, relation: Relation, operands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(Step::Relate {
            relation,
            operands: operands.into_iter().map(Into::into).collect(),
            advisory: false,
        });
        self
    }

    /// Label the case as known flaky
    #[must_use]
    pub fn known_flaky(mut self, reason: impl Into<String>) -> Self {
        self.known_flaky = Some(reason.into());
        self
    }

    /// Commands this case sends, preconditions first
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.preconditions.iter().map(|p| &p.command).chain(self.steps.iter().filter_map(|s| match s {
            Step::Send { command } => Some(command),
            _ => None,
        }))
    }
}

/// Ordered test cases sharing one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    /// Suite name
    pub name: String,
    /// What the suite covers
    #[serde(default)]
    pub description: String,
    /// Cases in execution order
    #[serde(default, rename = "case")]
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    /// Create an empty suite
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            cases: Vec::new(),
        }
    }

    /// Append a case
    #[must_use]
    pub fn case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    /// Append every case of another suite
    #[must_use]
    pub fn chain(mut self, other: TestSuite) -> Self {
        self.cases.extend(other.cases);
        self
    }

    /// Number of cases
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// True when the suite has no cases
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Look a case up by id
    pub fn get(&self, id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Give every command declared without a wait the default settle time
    #[must_use]
    pub fn with_default_wait(mut self, wait: Duration) -> Self {
        for case in &mut self.cases {
            let sends = case.steps.iter_mut().filter_map(|s| match s {
                Step::Send { command } => Some(command),
                _ => None,
            });
            for command in case.preconditions.iter_mut().map(|p| &mut p.command).chain(sends) {
                if command.quiescence.is_zero() {
                    command.quiescence = wait;
                }
            }
        }
        self
    }
}
