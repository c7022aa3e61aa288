//! Process exit codes
//!
//! A run that executes every case exits with `SUCCESS` whatever the verdicts;
//! the report carries the results. Non-zero codes mean the harness itself
//! could not do its job.

use crate::error::HarnessError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Every case executed
    pub const SUCCESS: u8 = 0;
    /// Report not written, or the run aborted on a link fault
    pub const ERROR: u8 = 1;
    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;
    /// Link could not be opened
    pub const CONNECTION_FAILED: u8 = 3;
    /// Link timed out
    pub const TIMEOUT: u8 = 4;
    /// Suite or config file not found
    pub const FILE_NOT_FOUND: u8 = 6;
    /// Bad configuration or suite file
    pub const CONFIG_ERROR: u8 = 8;
    /// Stopped with Ctrl-C
    pub const CANCELLED: u8 = 11;
    /// Serial port not found
    pub const PORT_NOT_FOUND: u8 = 14;
    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

const TABLE: &[(u8, &str)] = &[
    (ExitCodes::SUCCESS, "Success (all test cases executed)"),
    (ExitCodes::ERROR, "General error or run aborted"),
    (ExitCodes::INVALID_ARGS, "Invalid arguments"),
    (ExitCodes::CONNECTION_FAILED, "Connection failed"),
    (ExitCodes::TIMEOUT, "Connection timeout"),
    (ExitCodes::FILE_NOT_FOUND, "File not found"),
    (ExitCodes::CONFIG_ERROR, "Configuration or suite file error"),
    (ExitCodes::CANCELLED, "Cancelled by operator"),
    (ExitCodes::PORT_NOT_FOUND, "Port not found"),
    (ExitCodes::INTERNAL_ERROR, "Internal error"),
];

/// What a subcommand ended with
#[derive(Debug)]
pub enum CliResult {
    /// Done, with an optional closing line for stdout
    Success(Option<String>),
    /// Failed; the message goes to stderr
    Failure {
        /// Process exit code
        code: u8,
        /// Explanation
        message: String,
    },
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a closing line
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Failure {
            code,
            message: msg.into(),
        }
    }

    /// Run stopped by Ctrl-C
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::error(ExitCodes::CANCELLED, msg)
    }

    /// Exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Failure { code, .. } => *code,
        }
    }

    /// Closing line or failure message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(msg) => msg.as_deref(),
            Self::Failure { message, .. } => Some(message),
        }
    }

    /// As a process exit code
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Whether the process exits with 0
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<HarnessError> for CliResult {
    fn from(err: HarnessError) -> Self {
        Self::error(err.exit_code(), err.to_string())
    }
}

impl From<anyhow::Error> for CliResult {
    fn from(err: anyhow::Error) -> Self {
        Self::error(ExitCodes::ERROR, format!("{err:#}"))
    }
}

/// Meaning of an exit code
pub fn exit_code_description(code: u8) -> &'static str {
    TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map_or("Unknown error", |(_, text)| *text)
}

/// Print the exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for (code, text) in TABLE {
        println!("  {code:>3}  {text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::TransportError;

    #[test]
    fn test_cli_result() {
        let done = CliResult::success_with_message("26 passed");
        assert!(done.is_success());
        assert_eq!(done.code(), 0);
        assert_eq!(done.message(), Some("26 passed"));
        assert_eq!(CliResult::success().message(), None);

        let stopped = CliResult::cancelled("cancelled: 3 of 26 run");
        assert!(!stopped.is_success());
        assert_eq!(stopped.code(), ExitCodes::CANCELLED);
    }

    #[test]
    fn test_from_harness_error() {
        let result = CliResult::from(HarnessError::from(TransportError::PortNotFound("COM11".into())));
        assert_eq!(result.code(), ExitCodes::PORT_NOT_FOUND);
        assert_eq!(result.message(), Some("Connection error: Port not found: COM11"));
    }

    #[test]
    fn test_from_anyhow_keeps_context() {
        let err = anyhow::anyhow!("no such device").context("cannot enumerate serial ports");
        let result = CliResult::from(err);
        assert_eq!(result.code(), ExitCodes::ERROR);
        assert_eq!(result.message(), Some("cannot enumerate serial ports: no such device"));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(exit_code_description(ExitCodes::CANCELLED), "Cancelled by operator");
        assert_eq!(exit_code_description(5), "Unknown error");
        let mut codes: Vec<u8> = TABLE.iter().map(|(c, _)| *c).collect();
        codes.dedup();
        assert_eq!(codes.len(), TABLE.len());
    }
}
