//! Top-level harness errors

use crate::cli::ExitCodes;
use crate::config::ConfigError;
use crate::core::suite::SuiteFileError;
use crate::core::transport::TransportError;
use thiserror::Error;

/// Errors that end a harness invocation
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The link could not be opened or failed outright
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),

    /// Writing a report failed
    #[error("Report error: {0}")]
    Report(#[source] std::io::Error),

    /// Configuration could not be loaded or saved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A suite file could not be loaded
    #[error(transparent)]
    Suite(#[from] SuiteFileError),

    /// The run stopped before every case executed
    #[error("Run aborted: {0}")]
    Aborted(String),
}

impl HarnessError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Connection(e) => match e {
                TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
                TransportError::Timeout(_) => ExitCodes::TIMEOUT,
                TransportError::InvalidConfiguration(_) => ExitCodes::INVALID_ARGS,
                _ => ExitCodes::CONNECTION_FAILED,
            },
            Self::Report(_) => ExitCodes::ERROR,
            Self::Config(_) => ExitCodes::CONFIG_ERROR,
            Self::Suite(SuiteFileError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                ExitCodes::FILE_NOT_FOUND
            }
            Self::Suite(SuiteFileError::UnsupportedFormat(_)) => ExitCodes::INVALID_ARGS,
            Self::Suite(_) => ExitCodes::CONFIG_ERROR,
            Self::Aborted(_) => ExitCodes::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let missing = HarnessError::from(TransportError::PortNotFound("COM11".into()));
        assert_eq!(missing.exit_code(), ExitCodes::PORT_NOT_FOUND);
        let refused = HarnessError::from(TransportError::ConnectionFailed("busy".into()));
        assert_eq!(refused.exit_code(), ExitCodes::CONNECTION_FAILED);

        let no_file = HarnessError::from(SuiteFileError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)));
        assert_eq!(no_file.exit_code(), ExitCodes::FILE_NOT_FOUND);
        let format = HarnessError::from(SuiteFileError::UnsupportedFormat("ini".into()));
        assert_eq!(format.exit_code(), ExitCodes::INVALID_ARGS);

        assert_eq!(HarnessError::from(ConfigError::NoConfigDir).exit_code(), ExitCodes::CONFIG_ERROR);
        assert_eq!(HarnessError::Aborted("link lost".into()).exit_code(), ExitCodes::ERROR);
    }
}
