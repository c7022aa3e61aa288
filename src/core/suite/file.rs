//! Suite files (TOML or YAML, chosen by extension)

use super::TestSuite;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Suite file errors
#[derive(Error, Debug)]
pub enum SuiteFileError {
    /// Reading the file failed
    #[error("Cannot read suite file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or shape error
    #[error("Invalid TOML suite: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML syntax or shape error
    #[error("Invalid YAML suite: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Extension is neither TOML nor YAML
    #[error("Unsupported suite file format: {0}")]
    UnsupportedFormat(String),
}

/// Load a suite from `path`
pub fn load_suite(path: &Path) -> Result<TestSuite, SuiteFileError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let suite: TestSuite = match ext.as_str() {
        "toml" => toml::from_str(&std::fs::read_to_string(path)?)?,
        "yaml" | "yml" => serde_yaml::from_str(&std::fs::read_to_string(path)?)?,
        other => return Err(SuiteFileError::UnsupportedFormat(other.to_string())),
    };

    info!(path = %path.display(), suite = %suite.name, cases = suite.len(), "suite file loaded");
    Ok(suite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::suite::Step;
    use crate::core::verify::{Expectation, Template, Tolerance};
    use std::time::Duration;

    const TOML_SUITE: &str = r#"
name = "smoke"
description = "register round trip"

[[case]]
id = "RW-07"
description = "write and read a holding register"
steps = [
  { step = "send", command = { text = "write reg 100 value 12345", wait_ms = 500 } },
  { step = "send", command = { text = "read reg 100 1" } },
  { step = "expect", check = { expect = "numeric_within_tolerance", template = { kind = "register", addr = 100 }, expected = 12345, tolerance = { kind = "absolute", value = 0 } } },
]

[[case]]
id = "SH-01"
description = "show config"
known_flaky = "none really"

[[case.preconditions]]
description = "device answers"
command = { text = "show version", wait_ms = 200 }
check = { expect = "contains", text = "Version:" }

[[case.steps]]
step = "send"
command = { text = "show config", wait_ms = 500 }

[[case.steps]]
step = "delay"
ms = 250
"#;

    const YAML_SUITE: &str = r#"
name: gpio
case:
  - id: GPIO-05
    description: gpio mapping removed
    steps:
      - step: send
        command: { text: "no set gpio 21", wait_ms: 500 }
      - step: send
        command: { text: "show gpio", wait_ms: 500 }
      - step: expect
        check: { expect: absent, text: "GPIO 21" }
        advisory: true
"#;

    #[test]
    fn test_load_toml_suite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smoke.toml");
        std::fs::write(&path, TOML_SUITE).unwrap();

        let suite = load_suite(&path).unwrap();
        assert_eq!(suite.len(), 2);
        let rw = &suite.cases[0];
        assert_eq!(
            rw.steps[2],
            Step::Expect {
                check: Expectation::numeric(Template::register(100), 12345.0, Tolerance::Absolute(0.0)),
                advisory: false,
                label: None,
            }
        );
        let sh = &suite.cases[1];
        assert_eq!(sh.preconditions.len(), 1);
        assert_eq!(sh.steps[1], Step::Delay { duration: Duration::from_millis(250) });
        assert_eq!(sh.known_flaky.as_deref(), Some("none really"));
    }

    #[test]
    fn test_load_yaml_suite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpio.yml");
        std::fs::write(&path, YAML_SUITE).unwrap();

        let suite = load_suite(&path).unwrap();
        assert_eq!(suite.cases[0].id, "GPIO-05");
        assert!(matches!(suite.cases[0].steps[2], Step::Expect { advisory: true, .. }));
    }

    #[test]
    fn test_unsupported_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.ini");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(load_suite(&path), Err(SuiteFileError::UnsupportedFormat(_))));
        assert!(matches!(
            load_suite(&dir.path().join("missing.toml")),
            Err(SuiteFileError::Io(_))
        ));
    }
}
