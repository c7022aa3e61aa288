//! Harness settings
//!
//! Settings live in `harness.toml`. Lookup order: an explicit path, then the
//! per-user configuration directory, then built-in defaults.

mod settings;

pub use settings::{BenchSettings, ConfigError, DispatchSettings, HarnessConfig, LinkSettings, ReportSettings};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Configuration file name
pub const CONFIG_FILE: &str = "harness.toml";

/// Per-user `harness.toml`, if the platform has a configuration directory
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "hil-harness", "HilHarness").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
