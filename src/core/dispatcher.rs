//! Command dispatch
//!
//! Turns the asynchronous link into synchronous request/response calls:
//! clear the backlog, take an attribution marker, write the command, wait for
//! the response to complete, and drain the lines attributable to the marker.
//! `send` borrows the dispatcher mutably, so only one command is ever in
//! flight per transport.

use crate::core::collector::{Marker, ResponseLog, ResponseWindow};
use crate::core::logger::Transcript;
use crate::core::transport::{SharedTransport, TransportError};
use crate::utils::duration::millis;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Default settle time after a command
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_millis(500);

/// Default upper bound on a single dispatch
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Line terminator appended to every command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// `\r\n`
    #[default]
    Crlf,
    /// `\n`
    Lf,
    /// `\r`
    Cr,
}

impl LineEnding {
    /// Terminator text
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crlf => "\r\n",
            Self::Lf => "\n",
            Self::Cr => "\r",
        }
    }
}

impl std::str::FromStr for LineEnding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crlf" => Ok(Self::Crlf),
            "lf" => Ok(Self::Lf),
            "cr" => Ok(Self::Cr),
            other => Err(format!("unknown line ending '{other}'")),
        }
    }
}

/// How the dispatcher decides a response is complete
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum Completion {
    /// Wait the command's full quiescence period
    #[default]
    Fixed,
    /// Done once a line has arrived and the link then stays quiet for `idle`.
    /// Nothing within the quiescence period means an empty response.
    Idle {
        /// Silence that ends the response
        #[serde(rename = "idle_ms", with = "millis")]
        idle: Duration,
    },
    /// Done when a line matches `pattern`
    Marker {
        /// End-of-response regular expression
        pattern: String,
    },
}

impl Completion {
    /// Short name used in logs and the CLI
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Idle { .. } => "idle",
            Self::Marker { .. } => "marker",
        }
    }
}

/// One command line and how long to let the device answer it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Command text, sent verbatim followed by the line terminator
    pub text: String,
    /// Settle time after writing. Zero in a suite file means the suite default.
    #[serde(rename = "wait_ms", with = "millis", default)]
    pub quiescence: Duration,
    /// Per-command completion override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,
}

impl Command {
    /// Create a command with an explicit quiescence period
    pub fn new(text: impl Into<String>, quiescence: Duration) -> Self {
        Self {
            text: text.into(),
            quiescence,
            completion: None,
        }
    }

    /// Override the dispatcher's completion strategy for this command
    #[must_use]
    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Writing the command failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response did not complete in time
    #[error("No complete response to '{command}' within {} ms ({partial} lines received)", waited.as_millis())]
    Timeout {
        /// Command text
        command: String,
        /// Bound that was exceeded
        waited: Duration,
        /// Lines received before giving up
        partial: usize,
    },

    /// The background reader is gone
    #[error("Response collector stopped: {0}")]
    CollectorStopped(String),

    /// The end-of-response pattern does not compile
    #[error("Invalid end-of-response marker '{pattern}': {reason}")]
    InvalidMarker {
        /// Offending pattern
        pattern: String,
        /// Compiler message
        reason: String,
    },
}

impl DispatchError {
    /// Whether further commands on this link are pointless
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_fatal(),
            Self::CollectorStopped(_) => true,
            Self::Timeout { .. } | Self::InvalidMarker { .. } => false,
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Terminator appended to every command
    pub line_ending: LineEnding,
    /// Default completion strategy
    pub completion: Completion,
    /// Upper bound on waiting for any one response
    pub command_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            line_ending: LineEnding::Crlf,
            completion: Completion::Fixed,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Issues commands and returns their attributed responses
pub struct CommandDispatcher {
    transport: SharedTransport,
    log: ResponseLog,
    config: DispatcherConfig,
    transcript: Option<Transcript>,
    sent: u64,
}

impl CommandDispatcher {
    /// Create a dispatcher over a transport and the log its collector fills
    pub fn new(transport: SharedTransport, log: ResponseLog, config: DispatcherConfig) -> Self {
        Self {
            transport,
            log,
            config,
            transcript: None,
            sent: 0,
        }
    }

    /// Record TX lines to a transcript
    #[must_use]
    pub fn with_transcript(mut self, transcript: Option<Transcript>) -> Self {
        self.transcript = transcript;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Commands sent so far
    pub fn commands_sent(&self) -> u64 {
        self.sent
    }

    /// Annotate the transcript, if one is attached
    pub fn note(&self, message: &str) {
        if let Some(t) = &self.transcript {
            t.lock().log_info(message);
        }
    }

    /// Send one command and return the lines attributable to it
    pub async fn send(&mut self, command: &Command) -> Result<ResponseWindow, DispatchError> {
        if !self.log.is_running() {
            return Err(DispatchError::CollectorStopped(
                self.log.fault().unwrap_or_else(|| "not running".to_string()),
            ));
        }

        let completion = command
            .completion
            .clone()
            .unwrap_or_else(|| self.config.completion.clone());
        let end_marker = match &completion {
            Completion::Marker { pattern } => Some(Regex::new(pattern).map_err(|e| DispatchError::InvalidMarker {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?),
            _ => None,
        };

        let mut updates = self.log.subscribe();
        let payload = format!("{}{}", command.text, self.config.line_ending.as_str());

        let (marker, cleared) = {
            let mut transport = self.transport.lock().await;
            let cleared = self.log.clear();
            let marker = self.log.mark();
            transport.send(payload.as_bytes()).await?;
            (marker, cleared)
        };
        self.sent += 1;
        if let Some(t) = &self.transcript {
            t.lock().log_tx(&command.text, marker.seq);
        }
        debug!(command = %command.text, seq = marker.seq, cleared, strategy = completion.name(), "command sent");

        // A fixed settle is the caller's own bound; the timeout guards the
        // strategies that wait on device output.
        let wait = self.await_completion(&completion, end_marker.as_ref(), marker, command.quiescence, &mut updates);
        let timed_out = match &completion {
            Completion::Fixed => {
                wait.await;
                false
            }
            _ => tokio::time::timeout(self.config.command_timeout, wait).await.is_err(),
        };
        if timed_out {
            let partial = self.log.drain_since(marker);
            warn!(command = %command.text, lines = partial.len(), "command timed out");
            return Err(DispatchError::Timeout {
                command: command.text.clone(),
                waited: self.config.command_timeout,
                partial: partial.len(),
            });
        }

        let window = self.log.drain_since(marker);
        if window.is_empty() {
            if let Some(fault) = self.log.fault() {
                return Err(DispatchError::CollectorStopped(fault));
            }
        }
        debug!(command = %command.text, lines = window.len(), rejected = window.rejected(), "response drained");
        Ok(window)
    }

    async fn await_completion(
        &self,
        completion: &Completion,
        end_marker: Option<&Regex>,
        marker: Marker,
        quiescence: Duration,
        updates: &mut watch::Receiver<u64>,
    ) {
        match completion {
            Completion::Fixed => tokio::time::sleep(quiescence).await,
            Completion::Idle { idle } => {
                let first_deadline = tokio::time::Instant::now() + quiescence;
                while self.log.count_since(marker) == 0 {
                    if !self.log.is_running() {
                        return;
                    }
                    match tokio::time::timeout_at(first_deadline, updates.changed()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) | Err(_) => return,
                    }
                }
                loop {
                    match tokio::time::timeout(*idle, updates.changed()).await {
                        Ok(Ok(())) if self.log.is_running() => {}
                        _ => return,
                    }
                }
            }
            Completion::Marker { .. } => {
                let Some(re) = end_marker else {
                    return;
                };
                loop {
                    if self.log.any_since(marker, |line| re.is_match(&line.text)) || !self.log.is_running() {
                        return;
                    }
                    if updates.changed().await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collector::ResponseCollector;
    use crate::core::transport::{MockTransportTrait, SimulatedTransport, SimulatorConfig, TransportTrait};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    async fn simulated(config: SimulatorConfig, dispatch: DispatcherConfig) -> (CommandDispatcher, ResponseCollector) {
        let mut transport = SimulatedTransport::new(config);
        transport.connect().await.unwrap();
        let transport: Box<dyn TransportTrait> = Box::new(transport);
        let shared: SharedTransport = Arc::new(tokio::sync::Mutex::new(transport));
        let log = ResponseLog::new(256);
        let collector = ResponseCollector::spawn(shared.clone(), log.clone(), None);
        (CommandDispatcher::new(shared, log, dispatch), collector)
    }

    #[tokio::test]
    async fn test_fixed_completion_returns_response() {
        let (mut dispatcher, mut collector) = simulated(SimulatorConfig::default(), DispatcherConfig::default()).await;
        dispatcher.send(&Command::new("write reg 100 value 7", Duration::from_millis(60))).await.unwrap();
        let window = dispatcher
            .send(&Command::new("read reg 100 1", Duration::from_millis(60)))
            .await
            .unwrap();
        assert!(window.texts().any(|l| l == "Reg[100]: 7"), "{}", window.text());
        assert!(!window.text().contains("[OK] Reg[100]"));
        assert_eq!(dispatcher.commands_sent(), 2);
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_heartbeats_before_send_are_not_attributed() {
        let config = SimulatorConfig::default().heartbeat(Duration::from_millis(5));
        let (mut dispatcher, mut collector) = simulated(config, DispatcherConfig::default()).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let window = dispatcher
            .send(&Command::new("show version", Duration::from_millis(60)))
            .await
            .unwrap();
        assert!(window.texts().any(|l| l.starts_with("Version:")));
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_idle_completion_finishes_early() {
        let dispatch = DispatcherConfig {
            completion: Completion::Idle {
                idle: Duration::from_millis(40),
            },
            ..DispatcherConfig::default()
        };
        let (mut dispatcher, mut collector) = simulated(SimulatorConfig::default(), dispatch).await;

        let started = std::time::Instant::now();
        let window = dispatcher.send(&Command::new("help", Duration::from_secs(5))).await.unwrap();
        assert!(window.text().contains("Commands:"));
        assert!(started.elapsed() < Duration::from_secs(2));
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_marker_completion_and_timeout() {
        let dispatch = DispatcherConfig {
            command_timeout: Duration::from_millis(200),
            ..DispatcherConfig::default()
        };
        let (mut dispatcher, mut collector) = simulated(SimulatorConfig::default(), dispatch).await;

        let done = Command::new("read reg 10 3", Duration::ZERO).with_completion(Completion::Marker {
            pattern: r"^Reg\[12\]".to_string(),
        });
        let window = assert_ok!(dispatcher.send(&done).await);
        assert_eq!(window.texts().last(), Some("Reg[12]: 0"));

        let never = Command::new("show version", Duration::ZERO).with_completion(Completion::Marker {
            pattern: "^END$".to_string(),
        });
        let err = assert_err!(dispatcher.send(&never).await);
        assert!(matches!(err, DispatchError::Timeout { partial: 1, .. }), "{err}");
        assert!(!err.is_fatal());
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_fixed_settle_longer_than_timeout() {
        let dispatch = DispatcherConfig {
            command_timeout: Duration::from_millis(100),
            ..DispatcherConfig::default()
        };
        let (mut dispatcher, mut collector) = simulated(SimulatorConfig::default(), dispatch).await;

        let started = std::time::Instant::now();
        let window = assert_ok!(dispatcher.send(&Command::new("show version", Duration::from_millis(250))).await);
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert!(window.text().contains("Build #116"), "{}", window.text());
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_marker_rejected_before_send() {
        let (mut dispatcher, mut collector) = simulated(SimulatorConfig::default(), DispatcherConfig::default()).await;
        let bad = Command::new("help", Duration::ZERO).with_completion(Completion::Marker {
            pattern: "(".to_string(),
        });
        assert!(matches!(dispatcher.send(&bad).await, Err(DispatchError::InvalidMarker { .. })));
        assert_eq!(dispatcher.commands_sent(), 0);
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal() {
        let mut mock = MockTransportTrait::new();
        mock.expect_send().returning(|_| Err(TransportError::Disconnected));
        mock.expect_receive().returning(|| Ok(bytes::Bytes::new()));
        let transport: Box<dyn TransportTrait> = Box::new(mock);
        let shared: SharedTransport = Arc::new(tokio::sync::Mutex::new(transport));
        let log = ResponseLog::new(16);
        let mut collector = ResponseCollector::spawn(shared.clone(), log.clone(), None);
        let mut dispatcher = CommandDispatcher::new(shared, log, DispatcherConfig::default());

        let err = dispatcher
            .send(&Command::new("show config", Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_stopped_collector_is_fatal() {
        let (mut dispatcher, mut collector) = simulated(SimulatorConfig::default(), DispatcherConfig::default()).await;
        collector.stop().await;
        let err = dispatcher.send(&Command::new("help", Duration::ZERO)).await.unwrap_err();
        assert!(matches!(err, DispatchError::CollectorStopped(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_command_from_toml() {
        let cmd: Command = toml::from_str("text = 'show counters'\nwait_ms = 1000").unwrap();
        assert_eq!(cmd.quiescence, Duration::from_secs(1));
        let cmd: Command = toml::from_str("text = 'save'\n[completion]\nstrategy = 'idle'\nidle_ms = 50").unwrap();
        assert_eq!(cmd.quiescence, Duration::ZERO);
        assert_eq!(
            cmd.completion,
            Some(Completion::Idle {
                idle: Duration::from_millis(50)
            })
        );
    }
}
