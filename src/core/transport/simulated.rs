//! Simulated transport backed by a [`VirtualDevice`]

use super::{LinkCounters, TransportError, TransportTrait};
use crate::core::simulator::VirtualDevice;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Simulated link configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Device answering on the other end of the link
    pub device: VirtualDevice,
    /// Delay between a command arriving and its response becoming readable
    pub latency: Duration,
    /// Emit unsolicited `[HEARTBEAT]` lines at this interval
    pub heartbeat: Option<Duration>,
    /// Split responses into chunks of at most this many bytes
    pub chunk_size: Option<usize>,
    /// Fail `connect` as if the port did not exist
    pub refuse_connection: bool,
    /// Drop the link after this many commands have been processed
    pub drop_after_commands: Option<usize>,
    /// Upper bound on how long one `receive` waits for data
    pub poll_interval: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            device: VirtualDevice::default(),
            latency: Duration::from_millis(5),
            heartbeat: None,
            chunk_size: None,
            refuse_connection: false,
            drop_after_commands: None,
            poll_interval: Duration::from_millis(5),
        }
    }
}

impl SimulatorConfig {
    /// Use the given device
    #[must_use]
    pub fn with_device(mut self, device: VirtualDevice) -> Self {
        self.device = device;
        self
    }

    /// Set response latency
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Enable periodic heartbeat lines
    #[must_use]
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = Some(interval);
        self
    }

    /// Fragment responses into chunks
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }
}

/// Transport that talks to an in-process virtual device
pub struct SimulatedTransport {
    config: SimulatorConfig,
    connected: bool,
    dropped: bool,
    inbound: BytesMut,
    pending: VecDeque<(Instant, Bytes)>,
    commands: usize,
    last_heartbeat: Instant,
    counters: LinkCounters,
    connected_at: Option<Instant>,
}

impl SimulatedTransport {
    /// Create a new simulated transport
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            connected: false,
            dropped: false,
            inbound: BytesMut::new(),
            pending: VecDeque::new(),
            commands: 0,
            last_heartbeat: Instant::now(),
            counters: LinkCounters::default(),
            connected_at: None,
        }
    }

    /// Device behind this link
    pub fn device(&self) -> &VirtualDevice {
        &self.config.device
    }

    fn enqueue(&mut self, lines: Vec<String>, ready_at: Instant) {
        if lines.is_empty() {
            return;
        }
        let mut payload = lines.join("\r\n");
        payload.push_str("\r\n");
        let payload = Bytes::from(payload);

        match self.config.chunk_size {
            Some(size) => {
                let mut offset = 0;
                while offset < payload.len() {
                    let end = (offset + size).min(payload.len());
                    self.pending.push_back((ready_at, payload.slice(offset..end)));
                    offset = end;
                }
            }
            None => self.pending.push_back((ready_at, payload)),
        }
    }

    fn maybe_heartbeat(&mut self, now: Instant) {
        let Some(interval) = self.config.heartbeat else {
            return;
        };
        if now.duration_since(self.last_heartbeat) >= interval {
            self.last_heartbeat = now;
            let uptime = self
                .connected_at
                .map(|t| now.duration_since(t).as_secs())
                .unwrap_or(0);
            self.enqueue(vec![format!("[HEARTBEAT] uptime={uptime}s")], now);
        }
    }
}

#[async_trait]
impl TransportTrait for SimulatedTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.config.refuse_connection {
            return Err(TransportError::PortNotFound("simulator".to_string()));
        }
        self.connected = true;
        self.dropped = false;
        self.commands = 0;
        self.pending.clear();
        self.inbound.clear();
        self.counters = LinkCounters::default();
        self.connected_at = Some(Instant::now());
        self.last_heartbeat = Instant::now();
        info!(unit_id = self.config.device.unit_id(), "simulated device connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.connected {
            info!("simulated device disconnected");
        }
        self.connected = false;
        self.connected_at = None;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected && !self.dropped
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.dropped {
            return Err(TransportError::Disconnected);
        }

        self.inbound.extend_from_slice(data);
        self.counters.record_write(data.len());

        let ready_at = Instant::now() + self.config.latency;
        while let Some(pos) = self.inbound.iter().position(|&b| b == b'\n') {
            let line = self.inbound.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);
            if text.trim().is_empty() {
                continue;
            }

            let response = self.config.device.handle_line(text);
            debug!(command = text, lines = response.len(), "simulated device answered");
            self.enqueue(response, ready_at);
            self.commands += 1;

            if self.config.drop_after_commands.is_some_and(|n| self.commands >= n) {
                warn!(commands = self.commands, "simulated link dropped");
                self.dropped = true;
                break;
            }
        }

        Ok(data.len())
    }

    async fn receive(&mut self) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.dropped {
            return Err(TransportError::Disconnected);
        }

        let now = Instant::now();
        self.maybe_heartbeat(now);

        let wait = match self.pending.front() {
            Some((ready_at, _)) if *ready_at <= now => None,
            Some((ready_at, _)) => Some(ready_at.duration_since(now).min(self.config.poll_interval)),
            None => Some(self.config.poll_interval),
        };

        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
            return Ok(Bytes::new());
        }

        let chunk = self.pending.pop_front().map(|(_, chunk)| chunk).unwrap_or_default();
        self.counters.record_read(chunk.len());
        Ok(chunk)
    }

    fn describe(&self) -> String {
        format!("simulator (unit {})", self.config.device.unit_id())
    }

    fn counters(&self) -> LinkCounters {
        LinkCounters {
            open_for: self.connected_at.map(|t| t.elapsed()).unwrap_or_default(),
            ..self.counters.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(transport: &mut SimulatedTransport, wait: Duration) -> String {
        let deadline = Instant::now() + wait;
        let mut out = Vec::new();
        while Instant::now() < deadline {
            out.extend_from_slice(&transport.receive().await.unwrap());
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn test_command_round_trip() {
        let mut transport = SimulatedTransport::new(SimulatorConfig::default());
        transport.connect().await.unwrap();
        transport.send(b"show version\r\n").await.unwrap();
        let text = read_all(&mut transport, Duration::from_millis(50)).await;
        assert!(text.contains("Version: v1.0.0 Build #116"), "{text}");
    }

    #[tokio::test]
    async fn test_partial_lines_are_buffered() {
        let mut transport = SimulatedTransport::new(SimulatorConfig::default().chunk_size(3));
        transport.connect().await.unwrap();
        transport.send(b"show ver").await.unwrap();
        transport.send(b"sion\n").await.unwrap();
        let text = read_all(&mut transport, Duration::from_millis(80)).await;
        assert!(text.contains("Build #116"), "{text}");
        assert_eq!(transport.device().commands_seen(), vec!["show version".to_string()]);

        let counters = transport.counters();
        assert_eq!((counters.writes, counters.bytes_sent), (2, 13));
        assert_eq!(counters.bytes_received as usize, text.len());
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let config = SimulatorConfig {
            refuse_connection: true,
            ..SimulatorConfig::default()
        };
        let mut transport = SimulatedTransport::new(config);
        assert!(matches!(transport.connect().await, Err(TransportError::PortNotFound(_))));
        assert!(transport.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_link_drop() {
        let config = SimulatorConfig {
            drop_after_commands: Some(1),
            ..SimulatorConfig::default()
        };
        let mut transport = SimulatedTransport::new(config);
        transport.connect().await.unwrap();
        transport.send(b"show config\n").await.unwrap();
        assert!(matches!(transport.receive().await, Err(TransportError::Disconnected)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let mut transport = SimulatedTransport::new(SimulatorConfig::default());
        assert!(matches!(transport.send(b"help\n").await, Err(TransportError::NotConnected)));
    }
}
