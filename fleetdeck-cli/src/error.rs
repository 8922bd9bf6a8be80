//! CLI error types and exit codes.

use fleetdeck_core::{
    ConfigError, ConnectError, CredentialError, ExecError, FleetError, SessionError, StoreError,
    TerminalError,
};

/// Exit codes for CLI operations
pub mod exit_codes {
    /// General error - configuration, validation, or other non-connection errors
    pub const GENERAL_ERROR: i32 = 1;
    /// Connection failure - a host could not be reached or a test failed
    pub const CONNECTION_FAILURE: i32 = 2;
    /// The command was refused by the safety classifier
    pub const REFUSED: i32 = 3;
}

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Host not found
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// Credential error
    #[error("Credential error: {0}")]
    Credential(String),

    /// Connectivity test failed
    #[error("Connection test failed: {0}")]
    TestFailed(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Command error
    #[error("Command error: {0}")]
    Command(String),

    /// Command refused as unsafe
    #[error("{0}")]
    Refused(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<CredentialError> for CliError {
    fn from(err: CredentialError) -> Self {
        Self::Credential(err.to_string())
    }
}

impl From<ConnectError> for CliError {
    fn from(err: ConnectError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => Self::HostNotFound(id),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<ExecError> for CliError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Connect(e) => e.into(),
            ExecError::Credential(e) => e.into(),
            ExecError::Session(e) => e.into(),
            ExecError::Store(e) => e.into(),
            refused @ ExecError::Refused(_) => Self::Refused(refused.to_string()),
            other => Self::Command(other.to_string()),
        }
    }
}

impl From<TerminalError> for CliError {
    fn from(err: TerminalError) -> Self {
        match err {
            TerminalError::Store(e) => e.into(),
            TerminalError::Credential(e) => e.into(),
            TerminalError::Connect(e) => e.into(),
            TerminalError::Session(e) => e.into(),
        }
    }
}

impl From<FleetError> for CliError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::Connect(e) => e.into(),
            FleetError::Credential(e) => e.into(),
            FleetError::Session(e) => e.into(),
            FleetError::Store(e) => e.into(),
            FleetError::Config(e) => e.into(),
            FleetError::Exec(e) => e.into(),
            FleetError::Terminal(e) => e.into(),
        }
    }
}

impl CliError {
    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit codes:
    /// - 0: Success (not an error)
    /// - 1: General error (configuration, credentials, IO)
    /// - 2: Connection failure (unreachable host, failed test, unknown host)
    /// - 3: Command refused by the safety classifier
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::TestFailed(_) | Self::HostNotFound(_) | Self::Connection(_) => {
                exit_codes::CONNECTION_FAILURE
            }
            Self::Refused(_) => exit_codes::REFUSED,
            Self::Config(_) | Self::Credential(_) | Self::Command(_) | Self::Io(_) => {
                exit_codes::GENERAL_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdeck_core::classify;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Config("x".into()).exit_code(), 1);
        assert_eq!(CliError::TestFailed("x".into()).exit_code(), 2);
        assert_eq!(
            CliError::from(ConnectError::Unreachable("h:22".into())).exit_code(),
            2
        );
        let refused = ExecError::Refused(Box::new(classify("rm -rf /")));
        assert_eq!(CliError::from(refused).exit_code(), 3);
        assert_eq!(CliError::from(ExecError::Timeout(5)).exit_code(), 1);
    }

    #[test]
    fn test_store_not_found_maps_to_host_not_found() {
        let err = StoreError::NotFound {
            kind: "host",
            id: "web".into(),
        };
        assert!(matches!(CliError::from(err), CliError::HostNotFound(id) if id == "web"));
    }
}
