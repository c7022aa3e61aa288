//! Named, versioned response templates
//!
//! A template describes the shape of one line of device output that carries a
//! value. Extraction first looks for a conforming line, then parses the value,
//! so "the device said nothing useful" and "the device said something broken"
//! stay distinguishable from "the value is wrong".

use crate::core::collector::ResponseWindow;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Extraction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// No line conforms to the template
    #[error("no data: no line matches {template}")]
    NoData {
        /// Template name
        template: String,
    },

    /// A conforming line carries an unparsable value
    #[error("malformed {template} line: '{line}'")]
    Malformed {
        /// Template name
        template: String,
        /// Offending line
        line: String,
    },

    /// The custom pattern is unusable
    #[error("invalid template pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Why it was rejected
        reason: String,
    },
}

fn first_version() -> u32 {
    1
}

/// Value-carrying line shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Template {
    /// `Reg[<addr>]: <int>`
    Register {
        /// Register address
        addr: u16,
    },
    /// `Coil[<addr>]: <0|1>`
    Coil {
        /// Coil address
        addr: u16,
    },
    /// Free-form line; `pattern` must contain a `value` capture group
    Custom {
        /// Template name
        name: String,
        /// Template revision
        #[serde(default = "first_version")]
        version: u32,
        /// Regular expression with a `(?P<value>...)` group
        pattern: String,
    },
}

/// A value pulled out of a response
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Parsed value
    pub value: f64,
    /// The authoritative line
    pub line: String,
    /// When that line started arriving
    pub received_at: Instant,
}

impl Template {
    /// Register template
    pub fn register(addr: u16) -> Self {
        Self::Register { addr }
    }

    /// Coil template
    pub fn coil(addr: u16) -> Self {
        Self::Coil { addr }
    }

    /// Custom template at version 1
    pub fn custom(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Custom {
            name: name.into(),
            version: 1,
            pattern: pattern.into(),
        }
    }

    /// Template revision
    pub fn version(&self) -> u32 {
        match self {
            Self::Register { .. } | Self::Coil { .. } => 1,
            Self::Custom { version, .. } => *version,
        }
    }

    fn regex(&self) -> Result<Regex, ExtractionError> {
        let pattern = match self {
            Self::Register { addr } => format!(r"Reg\[{addr}\]:\s*(?P<value>\S*)"),
            Self::Coil { addr } => format!(r"Coil\[{addr}\]:\s*(?P<value>\S*)"),
            Self::Custom { pattern, .. } => pattern.clone(),
        };
        let re = Regex::new(&pattern).map_err(|e| ExtractionError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        if !re.capture_names().any(|n| n == Some("value")) {
            return Err(ExtractionError::InvalidPattern {
                pattern,
                reason: "missing (?P<value>...) group".to_string(),
            });
        }
        Ok(re)
    }

    fn parse_value(&self, raw: &str) -> Option<f64> {
        match self {
            Self::Register { .. } => raw.parse::<i64>().ok().map(|v| v as f64),
            Self::Coil { .. } => match raw.to_ascii_uppercase().as_str() {
                "1" | "ON" => Some(1.0),
                "0" | "OFF" => Some(0.0),
                _ => None,
            },
            Self::Custom { .. } => raw.parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Extract the value from the last conforming line of `window`
    pub fn extract(&self, window: &ResponseWindow) -> Result<Sample, ExtractionError> {
        let re = self.regex()?;
        let found = window.lines().iter().rev().find_map(|line| {
            re.captures(&line.text)
                .and_then(|caps| caps.name("value").map(|m| (line, m.as_str().to_string())))
        });

        let Some((line, raw)) = found else {
            return Err(ExtractionError::NoData {
                template: self.to_string(),
            });
        };

        let value = self.parse_value(raw.trim()).ok_or_else(|| ExtractionError::Malformed {
            template: self.to_string(),
            line: line.text.clone(),
        })?;

        Ok(Sample {
            value,
            line: line.text.clone(),
            received_at: line.received_at,
        })
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { addr } => write!(f, "register[{addr}]@v1"),
            Self::Coil { addr } => write!(f, "coil[{addr}]@v1"),
            Self::Custom { name, version, .. } => write!(f, "{name}@v{version}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_last_line_wins() {
        let window = ResponseWindow::from_text(["Reg[100]: 1", "Reg[101]: 9", "Reg[100]: 2"]);
        let sample = Template::register(100).extract(&window).unwrap();
        assert_eq!(sample.value, 2.0);
        assert_eq!(sample.line, "Reg[100]: 2");
    }

    #[test]
    fn test_register_address_is_exact() {
        let window = ResponseWindow::from_text(["Reg[1000]: 5"]);
        assert!(matches!(
            Template::register(100).extract(&window),
            Err(ExtractionError::NoData { .. })
        ));
    }

    #[test]
    fn test_malformed_is_distinct_from_no_data() {
        let window = ResponseWindow::from_text(["Reg[100]: abc"]);
        let err = Template::register(100).extract(&window).unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed { .. }));

        let empty = ResponseWindow::default();
        let err = Template::register(100).extract(&empty).unwrap_err();
        assert_eq!(err.to_string(), "no data: no line matches register[100]@v1");
    }

    #[test]
    fn test_coil_accepts_numeric_and_words() {
        let window = ResponseWindow::from_text(["Coil[5]: ON"]);
        assert_eq!(Template::coil(5).extract(&window).unwrap().value, 1.0);
        let window = ResponseWindow::from_text(["Coil[5]: 0"]);
        assert_eq!(Template::coil(5).extract(&window).unwrap().value, 0.0);
    }

    #[test]
    fn test_custom_template_requires_value_group() {
        let window = ResponseWindow::from_text(["counter 1: value=1234 raw=1234 freq=1000Hz"]);
        let freq = Template::custom("counter-freq", r"counter 1: .*freq=(?P<value>\d+)Hz");
        assert_eq!(freq.extract(&window).unwrap().value, 1000.0);
        assert_eq!(freq.to_string(), "counter-freq@v1");

        let bad = Template::custom("bad", r"freq=(\d+)");
        assert!(matches!(bad.extract(&window), Err(ExtractionError::InvalidPattern { .. })));
    }
}
