//! Error types for `Fleetdeck`
//!
//! Errors are grouped by the failure taxonomy the core uses: connectivity,
//! credentials, per-session resources, persistence and configuration.
//! Malformed probe output and malformed control frames are never errors;
//! the parsers degrade to zero values instead.

use thiserror::Error;

use crate::safety::SafetyVerdict;

/// Failures while establishing an authenticated connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The remote side rejected the supplied credentials
    #[error("Authentication failed for {0}")]
    AuthFailed(String),

    /// The dial did not complete within its timeout
    #[error("Connection to {0} timed out")]
    Timeout(String),

    /// The target could not be reached (DNS, routing, refused)
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// Credentials could not be used as supplied
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Any other transport-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The pool has been shut down
    #[error("Connection pool is shut down")]
    PoolClosed,
}

/// Failures while turning an encrypted secret into plaintext
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// The vault key is missing or not a 32-byte hex string
    #[error("Invalid vault key: {0}")]
    InvalidKey(String),

    /// The ciphertext is not in the expected encoding
    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    /// Authentication of the ciphertext failed
    #[error("Failed to decrypt credentials")]
    DecryptFailed,

    /// The host requires a secret that is not configured
    #[error("Missing secret: {0}")]
    Missing(String),
}

/// Failures scoped to one logical session on an existing connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A new logical session could not be opened
    #[error("Failed to open session: {0}")]
    Open(String),

    /// Pseudo-terminal setup or resize failed
    #[error("PTY error: {0}")]
    Pty(String),

    /// The remote shell could not be started
    #[error("Failed to start shell: {0}")]
    Shell(String),

    /// A command could not be executed
    #[error("Command execution failed: {0}")]
    Exec(String),

    /// The underlying connection is closed
    #[error("Connection closed")]
    Closed,
}

/// Failures reported by a persistence collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested record does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind (host, monitor)
        kind: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The backend failed
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Failures while loading configuration or inventory files
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that could not be read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected schema
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// File that failed to parse
        path: String,
        /// Parser message
        message: String,
    },

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures of a one-shot command execution
#[derive(Debug, Error)]
pub enum ExecError {
    /// The command line is empty
    #[error("Command is required")]
    EmptyCommand,

    /// The host is not in the directory
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Credentials could not be resolved
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Connection acquisition failed
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The session failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The caller stopped waiting for the command
    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    /// The command was classified unsafe and not executed
    #[error("Refused to run `{}`: classified {}", .0.base_command, .0.category)]
    Refused(Box<SafetyVerdict>),
}

/// Failures before an interactive shell starts
#[derive(Debug, Error)]
pub enum TerminalError {
    /// The host is not in the directory
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Credentials could not be resolved
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Connection acquisition failed
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Session, PTY or shell setup failed
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Top-level error aggregating every area
#[derive(Debug, Error)]
pub enum FleetError {
    /// Connectivity error
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Credential error
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Session error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Persistence error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Command execution error
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Terminal setup error
    #[error(transparent)]
    Terminal(#[from] TerminalError),
}

/// Result type for connection operations
pub type ConnectResult<T> = Result<T, ConnectError>;

/// Result type for credential operations
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for command execution
pub type ExecResult<T> = Result<T, ExecError>;

/// Result type for terminal sessions
pub type TerminalResult<T> = Result<T, TerminalError>;
