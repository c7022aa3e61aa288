//! Sequential suite execution
//!
//! Cases run strictly one after another on one dispatcher. Every per-case
//! fault becomes a verdict at the case boundary; only link-level faults stop
//! the run, and the cases completed before them stay in the ledger.

use super::{Step, TestCase, TestSuite};
use crate::core::collector::ResponseWindow;
use crate::core::dispatcher::{Command, CommandDispatcher, DispatchError};
use crate::core::report::{LedgerEntry, ResultLedger};
use crate::core::verify::{evaluate, relate, Category, ExtractionError, Sample, Status, Verdict};
use chrono::Local;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one case
#[derive(Debug, Clone)]
pub struct CaseReport {
    /// Folded verdict
    pub verdict: Verdict,
    /// Link fault that makes further cases pointless
    pub fatal: Option<String>,
    /// Wall time spent on the case
    pub duration: Duration,
}

/// Result of a suite run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Cases executed and recorded
    pub executed: usize,
    /// Cases never started
    pub skipped: usize,
    /// Fault that stopped the run early
    pub aborted: Option<String>,
    /// Stopped by the operator
    pub cancelled: bool,
}

impl RunOutcome {
    /// True when every case of the suite was executed
    pub fn completed(&self) -> bool {
        self.aborted.is_none() && !self.cancelled
    }
}

enum StepFault {
    Timeout(String),
    Fatal(String),
    Invalid(String),
}

impl From<DispatchError> for StepFault {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Timeout { .. } => Self::Timeout(err.to_string()),
            e if e.is_fatal() => Self::Fatal(e.to_string()),
            e => Self::Invalid(e.to_string()),
        }
    }
}

/// Runs suites against a dispatcher
pub struct SuiteRunner<'a> {
    dispatcher: &'a mut CommandDispatcher,
    cancel: CancellationToken,
}

impl<'a> SuiteRunner<'a> {
    /// Create a runner
    pub fn new(dispatcher: &'a mut CommandDispatcher) -> Self {
        Self {
            dispatcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between cases once `cancel` fires
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every case of `suite` in order, recording into `ledger`
    pub async fn run(&mut self, suite: &TestSuite, ledger: &mut ResultLedger) -> RunOutcome {
        info!(suite = %suite.name, cases = suite.len(), "suite started");
        let mut outcome = RunOutcome::default();

        for (i, case) in suite.cases.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(suite = %suite.name, remaining = suite.len() - i, "suite cancelled");
                outcome.cancelled = true;
                outcome.skipped = suite.len() - i;
                break;
            }

            self.dispatcher.note(&format!("case {} start", case.id));
            let report = self.run_case(case).await;
            info!(
                id = %case.id,
                status = %report.verdict.status,
                ms = report.duration.as_millis() as u64,
                "case finished"
            );
            self.dispatcher
                .note(&format!("case {} {}", case.id, report.verdict.status));

            ledger.record(LedgerEntry {
                id: case.id.clone(),
                description: case.description.clone(),
                verdict: report.verdict,
                known_flaky: case.known_flaky.clone(),
                timestamp: Local::now(),
                duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            });
            outcome.executed += 1;

            if let Some(fault) = report.fatal {
                error!(id = %case.id, %fault, "link fault, aborting suite");
                outcome.aborted = Some(fault);
                outcome.skipped = suite.len() - i - 1;
                break;
            }
        }

        info!(suite = %suite.name, executed = outcome.executed, skipped = outcome.skipped, "suite finished");
        outcome
    }

    /// Run one case and fold its checks into a verdict
    pub async fn run_case(&mut self, case: &TestCase) -> CaseReport {
        let started = Instant::now();
        let (verdict, fatal) = match self.execute(case).await {
            Ok(verdict) => (verdict, None),
            Err((mut partial, fault)) => match fault {
                StepFault::Timeout(msg) => {
                    partial.push(Verdict::timeout(msg));
                    (Verdict::fold(partial), None)
                }
                StepFault::Invalid(msg) => {
                    partial.push(Verdict::fail(Category::InvalidCheck, msg));
                    (Verdict::fold(partial), None)
                }
                StepFault::Fatal(msg) => {
                    partial.push(Verdict::fail(Category::Transport, msg.clone()));
                    (Verdict::fold(partial), Some(msg))
                }
            },
        };
        CaseReport {
            verdict,
            fatal,
            duration: started.elapsed(),
        }
    }

    async fn dispatch(&mut self, command: &Command) -> Result<ResponseWindow, StepFault> {
        self.dispatcher.send(command).await.map_err(StepFault::from)
    }

    async fn execute(&mut self, case: &TestCase) -> Result<Verdict, (Vec<Verdict>, StepFault)> {
        for pre in &case.preconditions {
            let window = self.dispatch(&pre.command).await.map_err(|f| (Vec::new(), f))?;
            let verdict = evaluate(&window, &pre.check);
            if verdict.status != Status::Pass {
                debug!(id = %case.id, precondition = %pre.description, "precondition not met");
                return Ok(Verdict::fail(
                    Category::Precondition,
                    format!("precondition '{}' not met: {}", pre.description, verdict.diagnostic),
                ));
            }
        }

        let mut checks: Vec<Verdict> = Vec::new();
        let mut window = ResponseWindow::default();
        let mut samples: HashMap<&str, Result<Sample, ExtractionError>> = HashMap::new();

        for step in &case.steps {
            match step {
                Step::Send { command } => match self.dispatch(command).await {
                    Ok(w) => window = w,
                    Err(fault) => return Err((checks, fault)),
                },
                Step::Delay { duration } => tokio::time::sleep(*duration).await,
                Step::Expect { check, advisory, label } => {
                    let mut verdict = evaluate(&window, check);
                    // an empty window is missing data, never just a wrong value
                    if *advisory && !window.is_empty() {
                        verdict = verdict.advisory();
                    }
                    checks.push(verdict.labeled(label.as_deref().unwrap_or_default()));
                }
                Step::Probe { label, template } => {
                    let sample = template.extract(&window);
                    if let Err(e) = &sample {
                        checks.push(Verdict::from_extraction(e).labeled(label));
                    }
                    samples.insert(label.as_str(), sample);
                }
                Step::Relate {
                    relation,
                    operands,
                    advisory,
                } => {
                    let mut values = Vec::with_capacity(operands.len());
                    let mut unavailable = false;
                    for name in operands {
                        match samples.get(name.as_str()) {
                            Some(Ok(sample)) => values.push(sample.clone()),
                            // extraction failure already recorded
                            Some(Err(_)) => unavailable = true,
                            None => {
                                checks.push(Verdict::fail(
                                    Category::InvalidCheck,
                                    format!("value '{name}' was never captured"),
                                ));
                                unavailable = true;
                            }
                        }
                    }
                    if !unavailable {
                        let mut verdict = relate(relation, &values);
                        if *advisory {
                            verdict = verdict.advisory();
                        }
                        checks.push(verdict);
                    }
                }
            }
        }

        if checks.is_empty() {
            return Ok(Verdict::pass("completed"));
        }
        Ok(Verdict::fold(checks))
    }
}
