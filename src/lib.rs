//! # HIL Harness
//!
//! Hardware-in-the-loop test harness for an embedded device that exposes a
//! line-oriented text console over a serial link (an ESP32 Modbus server).
//!
//! ## Features
//!
//! - Serial and simulated links behind one transport trait
//! - Background line collection with per-command attribution, so late output
//!   of one command never leaks into the next command's response
//! - Fixed, idle and marker completion strategies, bounded by a timeout
//! - Declarative checks: text, patterns, templated numeric values with
//!   absolute or percentage tolerance, and relations across samples
//! - Built-in `complete` and `extended` suites, plus TOML/YAML suite files
//! - Plain-text and JSON reports, optional wire transcript
//! - CLI with exit codes
//!
//! ## Example
//!
//! ```rust,no_run
//! use hil_harness::{BenchProfile, HarnessSession, SessionConfig, SerialConfig, Transport};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SessionConfig::new(Transport::Serial(SerialConfig::new("COM11", 115200)));
//!     let suites = hil_harness::suites::by_name("complete", &BenchProfile::default()).unwrap_or_default();
//!
//!     let run = HarnessSession::execute(config, &suites, CancellationToken::new()).await?;
//!     println!("{}", run.ledger.summary());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod suites;
pub mod utils;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::{ConfigError, HarnessConfig};
pub use crate::core::dispatcher::{Command, CommandDispatcher, Completion, DispatchError, LineEnding};
pub use crate::core::report::{ReportGenerator, ReportHeader, ResultLedger, Summary};
pub use crate::core::session::{HarnessSession, SessionConfig, SessionRun};
pub use crate::core::suite::{load_suite, TestCase, TestSuite};
pub use crate::core::transport::{Framing, SerialConfig, SimulatorConfig, Transport, TransportError};
pub use crate::core::verify::{Category, Expectation, Relation, Status, Template, Tolerance, Verdict};
pub use crate::error::HarnessError;
pub use crate::suites::BenchProfile;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
