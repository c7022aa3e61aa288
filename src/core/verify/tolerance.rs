//! Numeric tolerance bands

use serde::{Deserialize, Serialize};
use std::fmt;

/// Acceptable deviation from an expected value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Tolerance {
    /// Fixed deviation in the value's own unit
    Absolute(f64),
    /// Deviation as a fraction of the expected value (0.05 = 5%)
    Percentage(f64),
}

impl Tolerance {
    /// Half-width of the band around `expected`
    pub fn band(&self, expected: f64) -> f64 {
        match *self {
            Self::Absolute(value) => value.abs(),
            Self::Percentage(value) => (expected * value).abs(),
        }
    }

    /// Whether `actual` lies inside the band around `expected`, edges included.
    /// Non-finite inputs never pass.
    pub fn accepts(&self, expected: f64, actual: f64) -> bool {
        let band = self.band(expected);
        if !(expected.is_finite() && actual.is_finite() && band.is_finite()) {
            return false;
        }
        (actual - expected).abs() <= band
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Absolute(value) => write!(f, "±{}", value.abs()),
            Self::Percentage(value) => write!(f, "±{}%", value.abs() * 100.0),
        }
    }
}
