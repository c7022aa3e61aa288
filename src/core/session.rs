//! Harness session
//!
//! A session owns one open link for one suite run: the transport, the
//! background collector reading it and the dispatcher writing to it. The
//! collector is stopped before the transport is closed, and `close` is safe
//! to call on any path out of a run.

use crate::core::collector::{ResponseCollector, ResponseLog, DEFAULT_LOG_CAPACITY};
use crate::core::dispatcher::{CommandDispatcher, DispatcherConfig};
use crate::core::logger::Transcript;
use crate::core::report::ResultLedger;
use crate::core::suite::{RunOutcome, SuiteRunner, TestSuite};
use crate::core::transport::{SharedTransport, Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Session configuration
#[derive(Clone)]
pub struct SessionConfig {
    /// Link to open
    pub transport: Transport,
    /// Dispatcher behavior
    pub dispatch: DispatcherConfig,
    /// Lines kept by the response log
    pub log_capacity: usize,
    /// Pause after opening, for devices that reset when the port opens
    pub settle_after_open: Duration,
    /// Optional wire transcript
    pub transcript: Option<Transcript>,
}

impl SessionConfig {
    /// Create a configuration with default dispatch settings
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            dispatch: DispatcherConfig::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            settle_after_open: Duration::ZERO,
            transcript: None,
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct SessionRun {
    /// Verdicts of every executed case
    pub ledger: ResultLedger,
    /// Abort/cancel information
    pub outcome: RunOutcome,
    /// Link description
    pub connection_info: String,
}

/// One open link with its collector and dispatcher
pub struct HarnessSession {
    transport: SharedTransport,
    collector: ResponseCollector,
    dispatcher: CommandDispatcher,
    connection_info: String,
    closed: bool,
}

impl HarnessSession {
    /// Open the link and start collecting. No retries: a failed open is returned as is.
    pub async fn open(config: SessionConfig) -> Result<Self, TransportError> {
        let mut transport = config.transport.build()?;
        if let Err(e) = transport.connect().await {
            let _ = transport.disconnect().await;
            warn!(error = %e, "failed to open link");
            return Err(e);
        }
        let connection_info = transport.describe();
        info!(link = %connection_info, "link open");

        let transport: SharedTransport = Arc::new(tokio::sync::Mutex::new(transport));
        let log = ResponseLog::new(config.log_capacity);
        let collector = ResponseCollector::spawn(transport.clone(), log.clone(), config.transcript.clone());

        if !config.settle_after_open.is_zero() {
            tokio::time::sleep(config.settle_after_open).await;
            let dropped = log.clear();
            info!(dropped, "boot output discarded");
        }

        let dispatcher =
            CommandDispatcher::new(transport.clone(), log, config.dispatch).with_transcript(config.transcript);

        Ok(Self {
            transport,
            collector,
            dispatcher,
            connection_info,
            closed: false,
        })
    }

    /// Dispatcher for this link
    pub fn dispatcher(&mut self) -> &mut CommandDispatcher {
        &mut self.dispatcher
    }

    /// Link description
    pub fn connection_info(&self) -> &str {
        &self.connection_info
    }

    /// Whether the collector is still reading
    pub fn is_healthy(&self) -> bool {
        self.collector.is_running()
    }

    /// Run suites in order into `ledger`, stopping at the first abort or cancel
    pub async fn run_suites(
        &mut self,
        suites: &[TestSuite],
        ledger: &mut ResultLedger,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let mut total = RunOutcome::default();
        for (i, suite) in suites.iter().enumerate() {
            let outcome = SuiteRunner::new(&mut self.dispatcher)
                .with_cancel(cancel.clone())
                .run(suite, ledger)
                .await;
            total.executed += outcome.executed;
            total.skipped += outcome.skipped;
            if !outcome.completed() {
                total.aborted = outcome.aborted;
                total.cancelled = outcome.cancelled;
                total.skipped += suites[i + 1..].iter().map(TestSuite::len).sum::<usize>();
                break;
            }
        }
        total
    }

    /// Stop the collector, then close the link. Idempotent.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(fault) = self.collector.stop().await {
            warn!(error = %fault, "collector ended with a link fault");
        }
        let mut transport = self.transport.lock().await;
        let counters = transport.counters();
        let result = transport.disconnect().await;
        info!(
            link = %self.connection_info,
            sent = counters.bytes_sent,
            received = counters.bytes_received,
            open_secs = counters.open_for.as_secs(),
            "link closed"
        );
        result
    }

    /// Open, run every suite, and close, on every path
    pub async fn execute(
        config: SessionConfig,
        suites: &[TestSuite],
        cancel: CancellationToken,
    ) -> Result<SessionRun, TransportError> {
        let mut session = Self::open(config).await?;
        let mut ledger = ResultLedger::new();
        let outcome = session.run_suites(suites, &mut ledger, cancel).await;
        if let Err(e) = session.close().await {
            warn!(error = %e, "error while closing link");
        }
        Ok(SessionRun {
            ledger,
            outcome,
            connection_info: session.connection_info.clone(),
        })
    }
}

/// A session left open by an early return or an unwinding panic still
/// releases the port: the collector cancels itself when dropped, and the
/// link is closed on the runtime in the background. Verdicts already in the
/// caller's ledger are unaffected. Release builds abort on panic, so there
/// this only covers early returns.
impl Drop for HarnessSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!(link = %self.connection_info, "session dropped without close");
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let transport = self.transport.clone();
        let link = std::mem::take(&mut self.connection_info);
        runtime.spawn(async move {
            if let Err(e) = transport.lock().await.disconnect().await {
                warn!(link = %link, error = %e, "error while closing dropped link");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::Command;
    use crate::core::simulator::VirtualDevice;
    use crate::core::suite::TestCase;
    use crate::core::transport::SimulatorConfig;
    use crate::core::verify::Expectation;

    #[tokio::test]
    async fn test_open_dispatch_close() {
        let device = VirtualDevice::default();
        let config = SessionConfig::new(Transport::Simulated(SimulatorConfig::default().with_device(device)));
        let mut session = HarnessSession::open(config).await.unwrap();
        assert!(session.is_healthy());

        let window = session
            .dispatcher()
            .send(&Command::new("show config", Duration::from_millis(40)))
            .await
            .unwrap();
        assert!(window.text().contains("Unit-ID: 20"));

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(!session.is_healthy());
    }

    #[tokio::test]
    async fn test_dropped_session_closes_link() {
        let config = SessionConfig::new(Transport::Simulated(SimulatorConfig::default()));
        let session = HarnessSession::open(config).await.unwrap();
        let transport = session.transport.clone();
        assert!(transport.lock().await.is_connected());

        drop(session);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!transport.lock().await.is_connected());
    }

    #[tokio::test]
    async fn test_refused_open_runs_nothing() {
        let config = SessionConfig::new(Transport::Simulated(SimulatorConfig {
            refuse_connection: true,
            ..SimulatorConfig::default()
        }));
        let suite = TestSuite::new("s", "").case(TestCase::new("A", "a").send("help", Duration::ZERO));
        let result = HarnessSession::execute(config, &[suite], CancellationToken::new()).await;
        assert!(matches!(result, Err(TransportError::PortNotFound(_))));
    }

    #[tokio::test]
    async fn test_execute_multiple_suites() {
        let config = SessionConfig::new(Transport::Simulated(SimulatorConfig::default()));
        let wait = Duration::from_millis(40);
        let a = TestSuite::new("a", "").case(
            TestCase::new("A-1", "help")
                .send("help", wait)
                .expect(Expectation::contains("Commands:")),
        );
        let b = TestSuite::new("b", "").case(
            TestCase::new("B-1", "version")
                .send("show version", wait)
                .expect(Expectation::contains("Build #116")),
        );
        let run = HarnessSession::execute(config, &[a, b], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(run.ledger.len(), 2);
        assert!(run.outcome.completed());
        assert!(run.ledger.summary().all_passed());
        assert_eq!(run.connection_info, "simulator (unit 20)");
    }
}
