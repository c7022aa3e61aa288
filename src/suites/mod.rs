//! Built-in test catalogs
//!
//! Two suites exercise the ESP32 Modbus server firmware over its console:
//!
//! - `complete`: console commands, register/coil access, hardware counting,
//!   GPIO mapping and static configuration
//! - `extended`: counter options, counter control, timers, dynamic mappings
//!   and persistence
//!
//! Both are parameterised by a [`BenchProfile`], which carries the bench
//! signal frequency and every wait the cases use.

mod complete;
mod extended;

pub use complete::complete;
pub use extended::extended;

use crate::core::suite::TestSuite;
use std::time::Duration;

/// Timing and wiring of the bench a suite runs on
#[derive(Debug, Clone, PartialEq)]
pub struct BenchProfile {
    /// Frequency of the signal wired to the counter input (Hz)
    pub signal_hz: f64,
    /// Settle time for `read` commands
    pub read_wait: Duration,
    /// Settle time for `show` commands
    pub show_wait: Duration,
    /// Settle time for configuration commands
    pub configure_wait: Duration,
    /// Pause after resetting or stopping a counter
    pub settle: Duration,
    /// Main counting window
    pub count_window: Duration,
    /// Timer on and off time
    pub timer_half_period: Duration,
    /// Pause between successive coil samples
    pub sample_interval: Duration,
}

impl BenchProfile {
    /// Real hardware: waits sized for the firmware's console
    pub fn hardware(signal_hz: f64) -> Self {
        Self {
            signal_hz,
            read_wait: Duration::from_millis(500),
            show_wait: Duration::from_millis(1000),
            configure_wait: Duration::from_millis(2000),
            settle: Duration::from_millis(500),
            count_window: Duration::from_secs(10),
            timer_half_period: Duration::from_millis(1000),
            sample_interval: Duration::from_millis(1000),
        }
    }

    /// Short waits and a fast signal, for the virtual device
    pub fn accelerated() -> Self {
        Self {
            signal_hz: 20_000.0,
            read_wait: Duration::from_millis(30),
            show_wait: Duration::from_millis(30),
            configure_wait: Duration::from_millis(40),
            settle: Duration::from_millis(40),
            count_window: Duration::from_millis(600),
            timer_half_period: Duration::from_millis(60),
            sample_interval: Duration::from_millis(40),
        }
    }

    /// A share of the counting window
    pub fn window(&self, fraction: f64) -> Duration {
        self.count_window.mul_f64(fraction)
    }
}

impl Default for BenchProfile {
    fn default() -> Self {
        Self::hardware(1000.0)
    }
}

/// Names accepted by [`by_name`]
pub fn names() -> &'static [&'static str] {
    &["complete", "extended", "all"]
}

/// Built-in suites for a name, in run order
pub fn by_name(name: &str, profile: &BenchProfile) -> Option<Vec<TestSuite>> {
    match name.to_lowercase().as_str() {
        "complete" => Some(vec![complete(profile)]),
        "extended" => Some(vec![extended(profile)]),
        "all" => Some(vec![complete(profile), extended(profile)]),
        _ => None,
    }
}

/// Counter 1 configuration in hardware mode on GPIO 13
pub(crate) fn counter_command(parameters: &str) -> String {
    format!("set counter 1 mode 1 parameter hw-mode:hw {parameters} hw-gpio:13")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_by_name() {
        let profile = BenchProfile::accelerated();
        assert_eq!(by_name("complete", &profile).unwrap().len(), 1);
        assert_eq!(by_name("ALL", &profile).unwrap().len(), 2);
        assert!(by_name("nightly", &profile).is_none());
        for name in names() {
            assert!(by_name(name, &profile).is_some(), "{name}");
        }
    }

    #[test]
    fn test_case_ids_are_unique() {
        let profile = BenchProfile::default();
        let mut seen = HashSet::new();
        for suite in by_name("all", &profile).unwrap() {
            for case in &suite.cases {
                assert!(seen.insert(case.id.clone()), "duplicate {}", case.id);
                assert!(!case.steps.is_empty(), "{} has no steps", case.id);
            }
        }
        assert_eq!(seen.len(), 38);
    }

    #[test]
    fn test_hardware_waits() {
        let profile = BenchProfile::hardware(2000.0);
        assert_eq!(profile.signal_hz, 2000.0);
        assert_eq!(profile.window(0.5), Duration::from_secs(5));
    }
}
