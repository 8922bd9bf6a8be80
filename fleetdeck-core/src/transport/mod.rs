//! Capability-typed remote-shell client
//!
//! The core never speaks the SSH wire protocol itself. It consumes three
//! capabilities: dialing an authenticated connection ([`SshDialer`]),
//! opening logical sessions over it ([`SshTransport`]) and driving one
//! session ([`RemoteSession`]). [`OpenSshDialer`] implements them over the
//! system `ssh` binary; the `mock` module provides a scripted implementation
//! for tests.

#[cfg(any(test, feature = "test-support"))]
pub mod mock;
mod openssh;

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{ConnectResult, SessionResult};
use crate::pool::ConnectionKey;

pub use openssh::{OpenSshDialer, classify_ssh_failure};

/// Authentication material handed to the dialer, already decrypted
#[derive(Clone)]
pub enum Credentials {
    /// Password authentication
    Password(SecretString),
    /// Inline private key
    PrivateKey(SecretString),
    /// Private key file on the local machine
    IdentityFile(PathBuf),
    /// Whatever the local SSH agent offers
    Agent,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password([REDACTED])"),
            Self::PrivateKey(_) => f.write_str("PrivateKey([REDACTED])"),
            Self::IdentityFile(path) => f.debug_tuple("IdentityFile").field(path).finish(),
            Self::Agent => f.write_str("Agent"),
        }
    }
}

/// Everything needed to dial one authenticated connection
#[derive(Debug, Clone)]
pub struct DialTarget {
    /// Pool key (`host:port`)
    pub key: ConnectionKey,
    /// Login user
    pub username: String,
    /// Resolved credentials
    pub credentials: Credentials,
}

impl DialTarget {
    /// Creates a dial target
    #[must_use]
    pub fn new(key: ConnectionKey, username: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            key,
            username: username.into(),
            credentials,
        }
    }
}

/// Captured result of a non-interactive command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
    /// Exit status, `None` when the remote side reported none
    pub exit_code: Option<i32>,
}

impl ExecOutput {
    /// Returns true when the command exited with status 0
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Stdout followed by stderr, separated by a newline when both are present
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Pseudo-terminal parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// Value for `TERM`
    pub term: String,
    /// Columns
    pub cols: u16,
    /// Rows
    pub rows: u16,
    /// Local echo on the remote line discipline
    pub echo: bool,
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
            echo: true,
        }
    }
}

/// Boxed writer half of a remote shell
pub type ShellWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Boxed reader half of a remote shell
pub type ShellReader = Pin<Box<dyn AsyncRead + Send>>;

/// Byte streams of a started shell
pub struct ShellStreams {
    /// Remote stdin
    pub stdin: ShellWriter,
    /// Remote stdout
    pub stdout: ShellReader,
    /// Remote stderr (empty when the PTY merges it into stdout)
    pub stderr: ShellReader,
}

impl std::fmt::Debug for ShellStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellStreams").finish_non_exhaustive()
    }
}

/// Dials new authenticated connections
#[async_trait]
pub trait SshDialer: Send + Sync {
    /// Establishes one authenticated connection
    ///
    /// # Errors
    ///
    /// Returns a connectivity error on authentication failure, timeout or
    /// an unreachable target.
    async fn dial(&self, target: &DialTarget) -> ConnectResult<Arc<dyn SshTransport>>;
}

/// One authenticated, multiplexed connection
///
/// Implementations must allow concurrent sessions from several callers.
#[async_trait]
pub trait SshTransport: Send + Sync {
    /// Sends a cheap no-op request to verify the connection is alive
    ///
    /// # Errors
    ///
    /// Returns an error when the connection no longer answers.
    async fn probe(&self) -> ConnectResult<()>;

    /// Opens a new logical session
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SessionError::Open`] when the connection
    /// refuses a new channel.
    async fn open_session(&self) -> SessionResult<Arc<dyn RemoteSession>>;

    /// Closes the connection
    async fn close(&self);
}

/// One logical session riding on a connection
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Runs a command to completion and captures its output
    ///
    /// # Errors
    ///
    /// Returns an error when the command could not be started.
    async fn exec(&self, command: &str) -> SessionResult<ExecOutput>;

    /// Requests a pseudo-terminal for a subsequent shell
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SessionError::Pty`] when the request is denied.
    async fn request_pty(&self, request: PtyRequest) -> SessionResult<()>;

    /// Starts the login shell
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SessionError::Shell`] when the shell or its
    /// pipes cannot be set up.
    async fn start_shell(&self) -> SessionResult<ShellStreams>;

    /// Propagates a new terminal geometry
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SessionError::Pty`] when no PTY is attached.
    async fn window_change(&self, cols: u16, rows: u16) -> SessionResult<()>;

    /// Closes the session
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let both = ExecOutput {
            stdout: "out".into(),
            stderr: "err".into(),
            exit_code: Some(1),
        };
        assert_eq!(both.combined(), "out\nerr");
        assert!(!both.success());

        let only_err = ExecOutput {
            stderr: "err".into(),
            ..ExecOutput::default()
        };
        assert_eq!(only_err.combined(), "err");
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::Password(SecretString::from("hunter2"));
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
    }
}
