//! Response collection
//!
//! A background task reads the shared transport continuously, assembles
//! inbound bytes into lines and appends them to a bounded [`ResponseLog`].
//! Each line carries a monotonically increasing sequence number and the
//! arrival instant of its first byte. The dispatcher takes a [`Marker`] right
//! before writing a command and later drains only the lines stamped at or
//! after that marker.

use crate::core::logger::Transcript;
use crate::core::transport::{SharedTransport, TransportError};
use bytes::BytesMut;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Default number of lines kept in the log
pub const DEFAULT_LOG_CAPACITY: usize = 4096;

/// Longest line accepted before it is cut
pub const MAX_LINE_LENGTH: usize = 4096;

/// One inbound line
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseLine {
    /// Position in arrival order
    pub seq: u64,
    /// Line text without terminator
    pub text: String,
    /// Arrival of the first byte of this line
    pub received_at: Instant,
    /// Wall-clock arrival, for reports and transcripts
    pub timestamp: DateTime<Local>,
}

/// Attribution point taken immediately before a command is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// First sequence number that may belong to the command
    pub seq: u64,
    /// Instant the command was handed to the transport
    pub sent_at: Instant,
}

/// Ordered lines attributed to a single command
#[derive(Debug, Clone, Default)]
pub struct ResponseWindow {
    lines: Vec<ResponseLine>,
    rejected: usize,
}

impl ResponseWindow {
    /// Build a window from lines already in arrival order
    pub fn new(lines: Vec<ResponseLine>) -> Self {
        Self { lines, rejected: 0 }
    }

    /// Build a window from bare text lines, stamped now. Used by tests and benches.
    pub fn from_text<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Instant::now();
        let timestamp = Local::now();
        Self::new(
            lines
                .into_iter()
                .enumerate()
                .map(|(i, text)| ResponseLine {
                    seq: i as u64,
                    text: text.into(),
                    received_at: now,
                    timestamp,
                })
                .collect(),
        )
    }

    /// Lines in arrival order
    pub fn lines(&self) -> &[ResponseLine] {
        &self.lines
    }

    /// Line texts in arrival order
    pub fn texts(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.lines.iter().map(|l| l.text.as_str())
    }

    /// Concatenated text, one line per row
    pub fn text(&self) -> String {
        self.texts().collect::<Vec<_>>().join("\n")
    }

    /// Number of lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when no line was attributed
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Stale lines discarded when this window was drained
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Arrival of the first attributed line
    pub fn first_received_at(&self) -> Option<Instant> {
        self.lines.first().map(|l| l.received_at)
    }

    /// Append another window, preserving order
    pub fn extend(&mut self, other: ResponseWindow) {
        self.rejected += other.rejected;
        self.lines.extend(other.lines);
    }
}

/// Splits a byte stream into text lines
///
/// Lines end at `\n`; a trailing `\r` is dropped, invalid UTF-8 is replaced,
/// and blank lines are skipped. A line longer than the limit is emitted in
/// pieces.
#[derive(Debug, Clone)]
pub struct LineAssembler {
    max_length: usize,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new(MAX_LINE_LENGTH)
    }
}

impl LineAssembler {
    /// Create an assembler with the given line length limit
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }
}

impl Decoder for LineAssembler {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            let raw = match src.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let mut line = src.split_to(pos + 1);
                    line.truncate(pos);
                    line
                }
                None if src.len() >= self.max_length => src.split_to(self.max_length),
                None => return Ok(None),
            };

            let text = String::from_utf8_lossy(&raw);
            let text = text.trim_end_matches('\r');
            if !text.trim().is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }
}

/// Counters describing the log's history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Lines appended since creation
    pub appended: u64,
    /// Lines evicted because the log was full
    pub overflowed: u64,
    /// Lines discarded by `drain_since` as older than the marker
    pub stale: u64,
    /// Lines discarded by `clear`
    pub cleared: u64,
}

struct LogState {
    lines: VecDeque<ResponseLine>,
    next_seq: u64,
    capacity: usize,
    running: bool,
    fault: Option<String>,
    stats: LogStats,
}

/// Bounded, shared log of inbound lines
///
/// The collector task is the only writer. The dispatcher reads, drains and
/// clears it.
#[derive(Clone)]
pub struct ResponseLog {
    state: Arc<Mutex<LogState>>,
    notify: Arc<watch::Sender<u64>>,
}

impl std::fmt::Debug for ResponseLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResponseLog")
            .field("buffered", &state.lines.len())
            .field("next_seq", &state.next_seq)
            .field("running", &state.running)
            .finish()
    }
}

impl Default for ResponseLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl ResponseLog {
    /// Create an empty log holding at most `capacity` lines
    pub fn new(capacity: usize) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(LogState {
                lines: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
                next_seq: 0,
                capacity: capacity.max(1),
                running: true,
                fault: None,
                stats: LogStats::default(),
            })),
            notify: Arc::new(notify),
        }
    }

    /// Append a line that started arriving at `received_at`. Returns its sequence number.
    pub fn append(&self, text: String, received_at: Instant) -> u64 {
        let seq = {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.lines.push_back(ResponseLine {
                seq,
                text,
                received_at,
                timestamp: Local::now(),
            });
            state.stats.appended += 1;
            if state.lines.len() > state.capacity {
                state.lines.pop_front();
                state.stats.overflowed += 1;
                if state.stats.overflowed.is_power_of_two() {
                    warn!(overflowed = state.stats.overflowed, "response log full, oldest lines dropped");
                }
            }
            seq
        };
        self.notify.send_replace(seq);
        seq
    }

    /// Take an attribution marker stamped now
    pub fn mark(&self) -> Marker {
        let seq = self.state.lock().next_seq;
        Marker {
            seq,
            sent_at: Instant::now(),
        }
    }

    /// Remove every buffered line and return those attributable to `marker`
    pub fn drain_since(&self, marker: Marker) -> ResponseWindow {
        let mut state = self.state.lock();
        let drained: Vec<ResponseLine> = state.lines.drain(..).collect();
        let total = drained.len();
        let lines: Vec<ResponseLine> = drained
            .into_iter()
            .filter(|line| attributable(line, marker))
            .collect();
        let rejected = total - lines.len();
        state.stats.stale += rejected as u64;
        drop(state);

        if rejected > 0 {
            debug!(rejected, marker = marker.seq, "discarded lines older than the command");
        }
        ResponseWindow { lines, rejected }
    }

    /// Number of buffered lines attributable to `marker`
    pub fn count_since(&self, marker: Marker) -> usize {
        self.state
            .lock()
            .lines
            .iter()
            .filter(|line| attributable(line, marker))
            .count()
    }

    /// Whether any buffered line attributable to `marker` satisfies `pred`
    pub fn any_since<F>(&self, marker: Marker, mut pred: F) -> bool
    where
        F: FnMut(&ResponseLine) -> bool,
    {
        self.state
            .lock()
            .lines
            .iter()
            .filter(|line| attributable(line, marker))
            .any(|line| pred(line))
    }

    /// Discard everything buffered. Returns the number of lines dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let n = state.lines.len();
        state.lines.clear();
        state.stats.cleared += n as u64;
        n
    }

    /// Lines currently buffered
    pub fn len(&self) -> usize {
        self.state.lock().lines.len()
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch channel updated with the sequence number of every appended line
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    /// Whether the collector feeding this log is still reading
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// The transport fault that stopped the collector, if any
    pub fn fault(&self) -> Option<String> {
        self.state.lock().fault.clone()
    }

    /// History counters
    pub fn stats(&self) -> LogStats {
        self.state.lock().stats
    }

    fn set_stopped(&self, fault: Option<String>) {
        {
            let mut state = self.state.lock();
            state.running = false;
            if fault.is_some() {
                state.fault = fault;
            }
        }
        // wake anyone waiting on new lines
        self.notify.send_modify(|_| {});
    }
}

fn attributable(line: &ResponseLine, marker: Marker) -> bool {
    line.seq >= marker.seq && line.received_at >= marker.sent_at
}

/// Background reader feeding a [`ResponseLog`]
pub struct ResponseCollector {
    log: ResponseLog,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<(), TransportError>>>,
}

impl ResponseCollector {
    /// Start reading `transport` into `log`
    pub fn spawn(transport: SharedTransport, log: ResponseLog, transcript: Option<Transcript>) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_log = log.clone();

        let handle = tokio::spawn(async move {
            let result = collect(transport, task_log.clone(), transcript, task_cancel).await;
            let fault = result.as_ref().err().map(ToString::to_string);
            task_log.set_stopped(fault);
            result
        });

        info!("response collector started");
        Self {
            log,
            cancel,
            handle: Some(handle),
        }
    }

    /// Log this collector appends to
    pub fn log(&self) -> &ResponseLog {
        &self.log
    }

    /// Whether the reader task is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the reader and wait for it to exit. Returns the transport fault
    /// that ended it early, if any. Safe to call more than once.
    pub async fn stop(&mut self) -> Option<TransportError> {
        self.cancel.cancel();
        let handle = self.handle.take()?;
        let outcome = match handle.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(join) => {
                error!(error = %join, "response collector task panicked");
                None
            }
        };
        info!(stats = ?self.log.stats(), "response collector stopped");
        outcome
    }
}

impl Drop for ResponseCollector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn collect(
    transport: SharedTransport,
    log: ResponseLog,
    transcript: Option<Transcript>,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    let mut assembler = LineAssembler::default();
    let mut buffer = BytesMut::with_capacity(8192);
    let mut line_started: Option<Instant> = None;

    loop {
        let read = async {
            let mut transport = transport.lock().await;
            let data = transport.receive().await;
            // stamped under the lock so a concurrent marker cannot precede it
            (data, Instant::now())
        };

        let (data, arrived) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = read => result,
        };

        match data {
            Ok(bytes) if !bytes.is_empty() => {
                trace!(len = bytes.len(), "collector read");
                if buffer.is_empty() {
                    line_started = Some(arrived);
                }
                buffer.extend_from_slice(&bytes);

                while let Some(text) = assembler.decode(&mut buffer)? {
                    let started = line_started.unwrap_or(arrived);
                    if let Some(t) = &transcript {
                        let seq = log.append(text.clone(), started);
                        t.lock().log_rx(&text, seq);
                    } else {
                        log.append(text, started);
                    }
                    // any leftover bytes arrived in this read
                    line_started = (!buffer.is_empty()).then_some(arrived);
                }
                if buffer.is_empty() {
                    line_started = None;
                }
            }
            Ok(_) => {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(e) => {
                error!(error = %e, "response collector lost the link");
                return Err(e);
            }
        }
    }
}
