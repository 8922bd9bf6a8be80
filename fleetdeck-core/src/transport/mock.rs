//! Scripted transport for tests
//!
//! [`MockDialer`] hands out [`MockTransport`]s that count probes and closes
//! and can be flipped unhealthy. Sessions answer `exec` from a shared script
//! and expose the far end of their shell streams through
//! [`MockSession::take_remote`], so a test can play the remote shell.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::DuplexStream;

use super::{
    DialTarget, ExecOutput, PtyRequest, RemoteSession, ShellStreams, SshDialer, SshTransport,
};
use crate::error::{ConnectError, ConnectResult, SessionError, SessionResult};

const SHELL_PIPE_CAPACITY: usize = 64 * 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Script = Arc<Mutex<HashMap<String, ExecOutput>>>;

/// Shared configuration and counters of a [`MockDialer`]
#[derive(Default)]
struct DialerState {
    dials: AtomicUsize,
    dial_delay: Mutex<Duration>,
    dial_error: Mutex<Option<ConnectError>>,
    session_error: Mutex<Option<SessionError>>,
    pty_error: Mutex<Option<SessionError>>,
    exec_delay: Mutex<Duration>,
    script: Script,
    transports: Mutex<Vec<Arc<MockTransport>>>,
    targets: Mutex<Vec<DialTarget>>,
}

/// Dialer producing in-process transports
#[derive(Clone, Default)]
pub struct MockDialer {
    state: Arc<DialerState>,
}

impl std::fmt::Debug for MockDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDialer")
            .field("dials", &self.dial_count())
            .finish_non_exhaustive()
    }
}

impl MockDialer {
    /// Creates a dialer whose dials succeed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dial attempts so far
    #[must_use]
    pub fn dial_count(&self) -> usize {
        self.state.dials.load(Ordering::SeqCst)
    }

    /// Delays every dial
    pub fn set_dial_delay(&self, delay: Duration) {
        *lock(&self.state.dial_delay) = delay;
    }

    /// Makes every following dial fail with `error` (`None` restores success)
    pub fn set_dial_error(&self, error: Option<ConnectError>) {
        *lock(&self.state.dial_error) = error;
    }

    /// Makes `open_session` fail on every transport
    pub fn set_session_error(&self, error: Option<SessionError>) {
        *lock(&self.state.session_error) = error;
    }

    /// Makes `request_pty` fail on every session
    pub fn set_pty_error(&self, error: Option<SessionError>) {
        *lock(&self.state.pty_error) = error;
    }

    /// Delays every `exec`
    pub fn set_exec_delay(&self, delay: Duration) {
        *lock(&self.state.exec_delay) = delay;
    }

    /// Scripts the output of `command`; unscripted commands succeed silently
    pub fn script(&self, command: impl Into<String>, output: ExecOutput) {
        lock(&self.state.script).insert(command.into(), output);
    }

    /// Scripts a successful command printing `stdout`
    pub fn script_stdout(&self, command: impl Into<String>, stdout: impl Into<String>) {
        self.script(
            command,
            ExecOutput {
                stdout: stdout.into(),
                stderr: String::new(),
                exit_code: Some(0),
            },
        );
    }

    /// Every transport dialed so far, oldest first
    #[must_use]
    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        lock(&self.state.transports).clone()
    }

    /// The most recently dialed transport
    #[must_use]
    pub fn last_transport(&self) -> Option<Arc<MockTransport>> {
        lock(&self.state.transports).last().cloned()
    }

    /// Targets passed to `dial`, oldest first
    #[must_use]
    pub fn targets(&self) -> Vec<DialTarget> {
        lock(&self.state.targets).clone()
    }
}

#[async_trait]
impl SshDialer for MockDialer {
    async fn dial(&self, target: &DialTarget) -> ConnectResult<Arc<dyn SshTransport>> {
        self.state.dials.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.targets).push(target.clone());

        let delay = *lock(&self.state.dial_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = lock(&self.state.dial_error).clone() {
            return Err(error);
        }

        let transport = Arc::new(MockTransport {
            key: target.key.to_string(),
            healthy: AtomicBool::new(true),
            probes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            sessions: Mutex::new(Vec::new()),
            state: Arc::clone(&self.state),
        });
        lock(&self.state.transports).push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// In-process connection with observable counters
pub struct MockTransport {
    key: String,
    healthy: AtomicBool,
    probes: AtomicUsize,
    closes: AtomicUsize,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    state: Arc<DialerState>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("key", &self.key)
            .field("healthy", &self.is_healthy())
            .field("probes", &self.probe_count())
            .field("closes", &self.close_count())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Pool key this transport was dialed for
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Makes probes succeed or fail
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Whether probes currently succeed
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Number of probes received
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Number of `close` calls received
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Sessions opened on this transport, oldest first
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        lock(&self.sessions).clone()
    }

    /// The most recently opened session
    #[must_use]
    pub fn last_session(&self) -> Option<Arc<MockSession>> {
        lock(&self.sessions).last().cloned()
    }
}

#[async_trait]
impl SshTransport for MockTransport {
    async fn probe(&self) -> ConnectResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.is_healthy() && self.close_count() == 0 {
            Ok(())
        } else {
            Err(ConnectError::Transport(format!("{} is not answering", self.key)))
        }
    }

    async fn open_session(&self) -> SessionResult<Arc<dyn RemoteSession>> {
        if self.close_count() > 0 {
            return Err(SessionError::Closed);
        }
        if let Some(error) = lock(&self.state.session_error).clone() {
            return Err(error);
        }
        let session = Arc::new(MockSession {
            state: Arc::clone(&self.state),
            executed: Mutex::new(Vec::new()),
            pty: Mutex::new(None),
            window_changes: Mutex::new(Vec::new()),
            remote: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        lock(&self.sessions).push(Arc::clone(&session));
        Ok(session)
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Far end of a mock shell, driven by the test
#[derive(Debug)]
pub struct RemoteShell {
    /// Reads what the client wrote to stdin
    pub stdin: DuplexStream,
    /// Writes what the client reads from stdout; drop it to end the session
    pub stdout: DuplexStream,
    /// Writes what the client reads from stderr
    pub stderr: DuplexStream,
}

/// In-process logical session
pub struct MockSession {
    state: Arc<DialerState>,
    executed: Mutex<Vec<String>>,
    pty: Mutex<Option<PtyRequest>>,
    window_changes: Mutex<Vec<(u16, u16)>>,
    remote: Mutex<Option<RemoteShell>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl MockSession {
    /// Commands passed to `exec`, in order
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    /// The PTY request, if one was made
    #[must_use]
    pub fn pty(&self) -> Option<PtyRequest> {
        lock(&self.pty).clone()
    }

    /// Window changes received, in order
    #[must_use]
    pub fn window_changes(&self) -> Vec<(u16, u16)> {
        lock(&self.window_changes).clone()
    }

    /// Takes the far end of the shell started on this session
    #[must_use]
    pub fn take_remote(&self) -> Option<RemoteShell> {
        lock(&self.remote).take()
    }

    /// Whether `close` was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn exec(&self, command: &str) -> SessionResult<ExecOutput> {
        lock(&self.executed).push(command.to_string());
        let delay = *lock(&self.state.exec_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let output = lock(&self.state.script).get(command).cloned();
        Ok(output.unwrap_or(ExecOutput {
            exit_code: Some(0),
            ..ExecOutput::default()
        }))
    }

    async fn request_pty(&self, request: PtyRequest) -> SessionResult<()> {
        if let Some(error) = lock(&self.state.pty_error).clone() {
            return Err(error);
        }
        *lock(&self.pty) = Some(request);
        Ok(())
    }

    async fn start_shell(&self) -> SessionResult<ShellStreams> {
        let (stdin_local, stdin_remote) = tokio::io::duplex(SHELL_PIPE_CAPACITY);
        let (stdout_local, stdout_remote) = tokio::io::duplex(SHELL_PIPE_CAPACITY);
        let (stderr_local, stderr_remote) = tokio::io::duplex(SHELL_PIPE_CAPACITY);

        *lock(&self.remote) = Some(RemoteShell {
            stdin: stdin_remote,
            stdout: stdout_remote,
            stderr: stderr_remote,
        });

        Ok(ShellStreams {
            stdin: Box::pin(stdin_local),
            stdout: Box::pin(stdout_local),
            stderr: Box::pin(stderr_local),
        })
    }

    async fn window_change(&self, cols: u16, rows: u16) -> SessionResult<()> {
        if self.pty().is_none() {
            return Err(SessionError::Pty("No PTY attached".to_string()));
        }
        lock(&self.window_changes).push((cols, rows));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
