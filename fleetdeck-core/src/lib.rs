//! Fleetdeck Core Library
//!
//! Shared machinery for managing a fleet of SSH-reachable Linux hosts:
//! pooled connections, interactive terminals, metrics collection, endpoint
//! uptime monitoring and one-shot command execution.
//!
//! # Crate Structure
//!
//! - [`models`] - Hosts, monitors and the records produced while working with them
//! - [`transport`] - SSH transport seam and the OpenSSH implementation
//! - [`pool`] - Keyed connection pool with health probing and idle eviction
//! - [`terminal`] - Bridges a duplex frame channel to a remote PTY shell
//! - [`monitoring`] - Periodic resource metrics collection
//! - [`uptime`] - HTTP and TCP endpoint checks with rolling uptime
//! - [`safety`] - Command safety classification
//! - [`exec`] - One-shot command execution with timeout
//! - [`store`] - Persistence traits and the in-memory store
//! - [`config`] - Settings and inventory files
//!
//! # Feature Flags
//!
//! - `test-support` - Scripted in-memory transport ([`transport::mock`])

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod exec;
pub mod models;
pub mod monitoring;
pub mod pool;
pub mod retry;
pub mod safety;
pub mod secret;
pub mod store;
pub mod terminal;
pub mod testing;
pub mod tracing;
pub mod transport;
pub mod uptime;

// Flat re-exports for the CLI and integration tests.

pub use config::{ConfigPaths, Inventory, Settings};
pub use error::{
    ConfigError, ConfigResult, ConnectError, ConnectResult, CredentialError, CredentialResult,
    ExecError, ExecResult, FleetError, SessionError, SessionResult, StoreError, StoreResult,
    TerminalError, TerminalResult,
};
pub use exec::{CommandRunner, UNKNOWN_EXIT_CODE};
pub use models::{
    AuthMethod, CommandRecord, DEFAULT_SSH_PORT, Host, HostStatus, MonitorDefinition, MonitorKind,
    MonitorState, ProbeStatus, TerminalSession, UptimeProbe,
};
pub use monitoring::{
    CollectionOutcome, CollectorConfig, MetricSample, MetricsCollector, NetworkRate,
};
pub use pool::{ConnectionKey, ConnectionPool, PoolConfig, PoolStats, RemoteConnection};
pub use retry::{RetryConfig, Retryable, retry_connect};
pub use safety::{SafetyCategory, SafetyVerdict, classify, parse_command};
pub use secret::{AesGcmVault, CredentialVault, LockedVault, PlaintextVault, resolve_credentials};
pub use store::{
    CommandLog, HostDirectory, MemoryStore, MetricsSink, MonitorDirectory, MonitorUpdate,
    SessionSink,
};
pub use terminal::{
    ControlMessage, Frame, FrameChannel, FrameSink, FrameSource, TerminalBridge, TerminalConfig,
    frame_channel,
};
pub use testing::{ConnectionTester, TestResult, TestSummary};
pub use crate::tracing::{TracingConfig, TracingLevel, init_tracing};
pub use transport::{
    Credentials, DialTarget, ExecOutput, OpenSshDialer, PtyRequest, RemoteSession, SshDialer,
    SshTransport,
};
pub use uptime::{
    CheckerConfig, EndpointProber, MonitorChecker, NetworkProber, ProbeResult, UptimeWindow,
};
