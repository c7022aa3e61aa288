//! Byte links to the device
//!
//! Two kinds: a local serial port, and an in-process
//! [`VirtualDevice`](crate::core::simulator::VirtualDevice) for running suites
//! without hardware. A transport only moves bytes; line assembly, attribution
//! and timing live in the collector and dispatcher.

mod serial;
mod simulated;

pub use serial::{list_ports, Framing, SerialConfig, SerialTransport};
pub use simulated::{SimulatedTransport, SimulatorConfig};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Which link to open
#[derive(Debug, Clone)]
pub enum Transport {
    /// Serial port
    Serial(SerialConfig),
    /// In-process virtual device
    Simulated(SimulatorConfig),
}

impl Transport {
    /// Target as shown in the report header
    pub fn target(&self) -> String {
        match self {
            Self::Serial(cfg) => format!("{} @ {}", cfg.port, cfg.baud_rate),
            Self::Simulated(_) => "simulator".to_string(),
        }
    }

    /// Build the link without opening it
    pub fn build(self) -> Result<Box<dyn TransportTrait>, TransportError> {
        Ok(match self {
            Self::Serial(cfg) => Box::new(SerialTransport::new(cfg)?),
            Self::Simulated(cfg) => Box::new(SimulatedTransport::new(cfg)),
        })
    }
}

/// Link failures
#[derive(Error, Debug)]
pub enum TransportError {
    /// Open failed for a reason other than the ones below
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Timed out
    #[error("Transport timeout after {0} ms")]
    Timeout(u64),

    /// No such port
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Port exists but may not be opened
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Settings rejected before opening
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Read or write failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Used before `connect` or after `disconnect`
    #[error("Not connected")]
    NotConnected,

    /// The other end went away
    #[error("Disconnected")]
    Disconnected,
}

impl TransportError {
    /// Whether the link is unusable after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::NotConnected | Self::IoError(_) | Self::PortNotFound(_)
        )
    }
}

/// Traffic counted since the link was opened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkCounters {
    /// Bytes written
    pub bytes_sent: u64,
    /// Bytes read
    pub bytes_received: u64,
    /// Write calls
    pub writes: u64,
    /// Reads that returned data
    pub reads: u64,
    /// Time since open, zero when closed
    pub open_for: Duration,
}

impl LinkCounters {
    pub(crate) fn record_write(&mut self, n: usize) {
        self.bytes_sent += n as u64;
        self.writes += 1;
    }

    pub(crate) fn record_read(&mut self, n: usize) {
        self.bytes_received += n as u64;
        self.reads += 1;
    }
}

/// A byte link to the device
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportTrait: Send + Sync {
    /// Open the link
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the link. Idempotent, and safe to call after a failed `connect`.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Whether the link is open
    fn is_connected(&self) -> bool;

    /// Write all of `data`
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Whatever arrived since the last call. Empty when nothing arrived
    /// within the link's read slice.
    async fn receive(&mut self) -> Result<Bytes, TransportError>;

    /// One-line description for logs
    fn describe(&self) -> String;

    /// Traffic so far
    fn counters(&self) -> LinkCounters;
}

/// A transport shared between the collector task and the dispatcher
pub type SharedTransport = Arc<tokio::sync::Mutex<Box<dyn TransportTrait>>>;
