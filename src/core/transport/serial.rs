//! Serial port link to the device console

use super::{LinkCounters, TransportError, TransportTrait};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Character framing written the usual way, e.g. `8N1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Framing {
    data_bits: DataBits,
    parity: Parity,
    stop_bits: StopBits,
}

impl Framing {
    /// Eight data bits, no parity, one stop bit
    pub const EIGHT_N_ONE: Self = Self {
        data_bits: DataBits::Eight,
        parity: Parity::None,
        stop_bits: StopBits::One,
    };
}

impl Default for Framing {
    fn default() -> Self {
        Self::EIGHT_N_ONE
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || format!("bad framing '{s}', expected e.g. 8N1 or 7E2");
        let mut chars = s.trim().chars();
        let (Some(d), Some(p), Some(st), None) = (chars.next(), chars.next(), chars.next(), chars.next()) else {
            return Err(bad());
        };

        let data_bits = match d {
            '5' => DataBits::Five,
            '6' => DataBits::Six,
            '7' => DataBits::Seven,
            '8' => DataBits::Eight,
            _ => return Err(bad()),
        };
        let parity = match p.to_ascii_uppercase() {
            'N' => Parity::None,
            'O' => Parity::Odd,
            'E' => Parity::Even,
            _ => return Err(bad()),
        };
        let stop_bits = match st {
            '1' => StopBits::One,
            '2' => StopBits::Two,
            _ => return Err(bad()),
        };
        Ok(Self {
            data_bits,
            parity,
            stop_bits,
        })
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        write!(f, "{}{parity}{}", u8::from(self.data_bits), u8::from(self.stop_bits))
    }
}

impl TryFrom<String> for Framing {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Framing> for String {
    fn from(framing: Framing) -> Self {
        framing.to_string()
    }
}

/// Serial link settings
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name, e.g. COM11 or /dev/ttyUSB0
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Character framing
    pub framing: Framing,
    /// How long one read blocks before reporting "nothing yet"
    pub read_slice: Duration,
}

impl SerialConfig {
    /// 8N1 on `port`
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            framing: Framing::EIGHT_N_ONE,
            read_slice: Duration::from_millis(20),
        }
    }

    /// Use another framing
    #[must_use]
    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.port.trim().is_empty() {
            Err(TransportError::InvalidConfiguration("serial port name is empty".into()))
        } else if self.baud_rate == 0 {
            Err(TransportError::InvalidConfiguration("baud rate must be positive".into()))
        } else {
            Ok(())
        }
    }

    fn open_error(&self, err: &serialport::Error) -> TransportError {
        match err.kind() {
            serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(ErrorKind::NotFound) => {
                TransportError::PortNotFound(self.port.clone())
            }
            serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
                TransportError::PermissionDenied(self.port.clone())
            }
            _ => TransportError::ConnectionFailed(format!("{}: {err}", self.port)),
        }
    }
}

/// Link over a local serial port.
///
/// Reads block for at most `read_slice`, so the collector can notice a stop
/// request between reads.
pub struct SerialTransport {
    config: SerialConfig,
    port: Mutex<Option<Box<dyn SerialPort + Send>>>,
    counters: LinkCounters,
    opened_at: Option<Instant>,
    scratch: Vec<u8>,
}

impl SerialTransport {
    /// Validate the settings. The port itself is opened by `connect`.
    pub fn new(config: SerialConfig) -> Result<Self, TransportError> {
        config.check()?;
        Ok(Self {
            config,
            port: Mutex::new(None),
            counters: LinkCounters::default(),
            opened_at: None,
            scratch: vec![0; 1024],
        })
    }
}

#[async_trait]
impl TransportTrait for SerialTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let framing = self.config.framing;
        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .data_bits(framing.data_bits)
            .parity(framing.parity)
            .stop_bits(framing.stop_bits)
            .flow_control(FlowControl::None)
            .timeout(self.config.read_slice)
            .open()
            .map_err(|e| self.config.open_error(&e))?;

        // The console sits behind a USB bridge; stale bytes from before the
        // open belong to nobody.
        if let Err(e) = port.clear(serialport::ClearBuffer::All) {
            debug!(error = %e, "could not clear serial buffers");
        }

        *self.port.lock() = Some(port);
        self.counters = LinkCounters::default();
        self.opened_at = Some(Instant::now());
        info!(port = %self.config.port, baud = self.config.baud_rate, framing = %framing, "serial port opened");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.port.get_mut().take().is_some() {
            info!(port = %self.config.port, "serial port closed");
        }
        self.opened_at = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.lock().is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let port = self.port.get_mut().as_mut().ok_or(TransportError::NotConnected)?;
        port.write_all(data)?;
        port.flush()?;
        self.counters.record_write(data.len());
        Ok(data.len())
    }

    async fn receive(&mut self) -> Result<Bytes, TransportError> {
        let port = self.port.get_mut().as_mut().ok_or(TransportError::NotConnected)?;
        match port.read(&mut self.scratch) {
            // A USB bridge that vanished reads as end of stream
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => {
                self.counters.record_read(n);
                Ok(Bytes::copy_from_slice(&self.scratch[..n]))
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Bytes::new()),
            Err(e) => {
                debug!(error = %e, port = %self.config.port, "serial read failed");
                Err(e.into())
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud ({})", self.config.port, self.config.baud_rate, self.config.framing)
    }

    fn counters(&self) -> LinkCounters {
        LinkCounters {
            open_for: self.opened_at.map(|t| t.elapsed()).unwrap_or_default(),
            ..self.counters.clone()
        }
    }
}

/// Serial ports present on this machine
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_parse() {
        assert_eq!("8N1".parse::<Framing>(), Ok(Framing::EIGHT_N_ONE));
        let seven_even_two: Framing = "7e2".parse().unwrap();
        assert_eq!(seven_even_two.to_string(), "7E2");
        assert!("8M1".parse::<Framing>().is_err());
        assert!("8N".parse::<Framing>().is_err());
        assert!("8N11".parse::<Framing>().is_err());
    }

    #[test]
    fn test_describe() {
        let transport = SerialTransport::new(SerialConfig::new("COM11", 115_200)).unwrap();
        assert_eq!(transport.describe(), "COM11 @ 115200 baud (8N1)");
        assert!(!transport.is_connected());
        assert_eq!(transport.counters().open_for, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_closed_port_refuses_io() {
        let mut transport = SerialTransport::new(SerialConfig::new("COM11", 115_200)).unwrap();
        assert!(transport.disconnect().await.is_ok());
        assert!(transport.disconnect().await.is_ok());
        assert!(matches!(
            transport.send(b"show config\r\n").await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(transport.receive().await, Err(TransportError::NotConnected)));
    }

    #[test]
    fn test_bad_settings_rejected() {
        assert!(matches!(
            SerialTransport::new(SerialConfig::new("COM11", 0)),
            Err(TransportError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            SerialTransport::new(SerialConfig::new("  ", 9600)),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }
}
