//! Serde helpers for durations written as integer milliseconds
//!
//! Used as `#[serde(with = "crate::utils::duration::millis")]`.

/// `Duration` <-> `u64` milliseconds
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as whole milliseconds
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    /// Deserialize from whole milliseconds
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wait {
        #[serde(with = "super::millis")]
        wait_ms: Duration,
    }

    #[test]
    fn test_millis_round_trip_through_toml() {
        let wait: Wait = toml::from_str("wait_ms = 1500").unwrap();
        assert_eq!(wait.wait_ms, Duration::from_millis(1500));

        let text = toml::to_string(&Wait { wait_ms: Duration::from_secs(2) }).unwrap();
        assert_eq!(text.trim(), "wait_ms = 2000");
    }
}
