//! Harness settings

use crate::core::dispatcher::{Completion, DispatcherConfig, LineEnding, DEFAULT_COMMAND_TIMEOUT, DEFAULT_QUIESCENCE};
use crate::core::transport::{Framing, SerialConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid harness TOML
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serializing the configuration failed
    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No per-user configuration directory on this platform
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Harness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Serial link
    pub link: LinkSettings,
    /// Command dispatch
    pub dispatch: DispatchSettings,
    /// Report output
    pub report: ReportSettings,
    /// Test bench wiring
    pub bench: BenchSettings,
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Port name
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Character framing, e.g. `8N1`
    pub framing: Framing,
    /// Command terminator
    pub line_ending: LineEnding,
    /// Pause after opening while the device reboots
    pub settle_after_open_ms: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            port: "COM11".to_string(),
            baud_rate: 115_200,
            framing: Framing::EIGHT_N_ONE,
            line_ending: LineEnding::Crlf,
            settle_after_open_ms: 1000,
        }
    }
}

/// Dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Settle time for plain read/show commands
    pub default_quiescence_ms: u64,
    /// Upper bound on one command
    pub command_timeout_ms: u64,
    /// Response log capacity in lines
    pub log_capacity: usize,
    /// Completion strategy
    pub completion: Completion,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_quiescence_ms: DEFAULT_QUIESCENCE.as_millis() as u64,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT.as_millis() as u64,
            log_capacity: 4096,
            completion: Completion::Fixed,
        }
    }
}

/// Report settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Plain-text report path
    pub path: PathBuf,
    /// Report title
    pub title: String,
    /// Firmware identifier printed in the header
    pub firmware: String,
    /// Optional JSON report path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<PathBuf>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("TEST_REPORT.txt"),
            title: "ESP32 MODBUS SERVER - TEST REPORT".to_string(),
            firmware: "v1.0.0 Build #116".to_string(),
            json: None,
        }
    }
}

/// Test bench settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchSettings {
    /// Frequency of the signal wired to the counter input
    pub signal_hz: f64,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self { signal_hz: 1000.0 }
    }
}

impl HarnessConfig {
    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Load `path` if given, else the per-user file if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        match super::default_config_path() {
            Some(default) if default.exists() => Self::load_from(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Save to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save to the per-user file
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = super::default_config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Serial port settings
    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig::new(&self.link.port, self.link.baud_rate).framing(self.link.framing)
    }

    /// Dispatcher settings
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            line_ending: self.link.line_ending,
            completion: self.dispatch.completion.clone(),
            command_timeout: Duration::from_millis(self.dispatch.command_timeout_ms),
        }
    }

    /// Settle time for plain commands
    pub fn default_quiescence(&self) -> Duration {
        Duration::from_millis(self.dispatch.default_quiescence_ms)
    }

    /// Pause after opening the link
    pub fn settle_after_open(&self) -> Duration {
        Duration::from_millis(self.link.settle_after_open_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: HarnessConfig = toml::from_str(
            r#"
[link]
port = "/dev/ttyUSB0"
framing = "8E1"

[dispatch]
completion = { strategy = "idle", idle_ms = 150 }
"#,
        )
        .unwrap();
        assert_eq!(config.link.port, "/dev/ttyUSB0");
        assert_eq!(config.link.baud_rate, 115_200);
        assert_eq!(config.link.framing.to_string(), "8E1");
        assert_eq!(config.dispatch.command_timeout_ms, 10_000);
        assert_eq!(
            config.dispatcher_config().completion,
            Completion::Idle {
                idle: Duration::from_millis(150)
            }
        );
        assert_eq!(config.report.path, PathBuf::from("TEST_REPORT.txt"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harness.toml");
        let mut config = HarnessConfig::default();
        config.bench.signal_hz = 2000.0;
        config.link.framing = "7E1".parse().unwrap();
        config.report.json = Some(PathBuf::from("report.json"));
        config.save_to(&path).unwrap();

        let loaded = HarnessConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.serial_config().framing.to_string(), "7E1");
    }

    #[test]
    fn test_bad_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(&path, "[link]\nbaud_rate = \"fast\"").unwrap();
        assert!(matches!(HarnessConfig::load_from(&path), Err(ConfigError::Parse(_))));
        std::fs::write(&path, "[link]\nframing = \"9X1\"").unwrap();
        assert!(matches!(HarnessConfig::load_from(&path), Err(ConfigError::Parse(_))));
        assert!(matches!(
            HarnessConfig::load_from(&dir.path().join("none.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
