//! Terminal bridge
//!
//! Joins a remote PTY shell to a message channel. Three tasks run for the
//! lifetime of a session: remote stdout to channel, remote stderr to channel
//! and channel to remote stdin. The session ends when stdout reaches EOF or
//! fails, or when the client goes away; the remaining tasks are then
//! cancelled and awaited.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::channel::{Frame, FrameSink, FrameSource};
use super::control::ControlMessage;
use crate::error::{SessionError, TerminalError, TerminalResult};
use crate::models::{Host, TerminalSession};
use crate::pool::ConnectionPool;
use crate::secret::{CredentialVault, resolve_credentials};
use crate::store::{HostDirectory, SessionSink};
use crate::tracing::span_names;
use crate::transport::{
    DialTarget, PtyRequest, RemoteSession, ShellReader, ShellStreams, ShellWriter,
};

/// Terminal defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalConfig {
    /// Initial PTY request
    pub pty: PtyRequest,
    /// Read buffer per output stream
    pub read_buffer_size: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            pty: PtyRequest::default(),
            read_buffer_size: 4096,
        }
    }
}

/// Usage counters shared by the forwarding tasks
#[derive(Debug, Default)]
struct Counters {
    bytes: AtomicU64,
    commands: AtomicU64,
}

/// Bridges interactive shells to message channels
#[derive(Clone)]
pub struct TerminalBridge {
    pool: ConnectionPool,
    hosts: Arc<dyn HostDirectory>,
    sessions: Arc<dyn SessionSink>,
    vault: Arc<dyn CredentialVault>,
    config: TerminalConfig,
}

impl std::fmt::Debug for TerminalBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalBridge")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TerminalBridge {
    /// Creates a bridge
    #[must_use]
    pub fn new(
        pool: ConnectionPool,
        hosts: Arc<dyn HostDirectory>,
        sessions: Arc<dyn SessionSink>,
        vault: Arc<dyn CredentialVault>,
        config: TerminalConfig,
    ) -> Self {
        Self {
            pool,
            hosts,
            sessions,
            vault,
            config,
        }
    }

    /// Runs one terminal session for `host_id` until it ends
    ///
    /// Setup failures are reported to the channel as an `Error: …` text
    /// frame and returned; no session record is written for them.
    ///
    /// # Errors
    ///
    /// Returns a [`TerminalError`] when the host, credentials, connection,
    /// PTY or shell cannot be set up.
    pub async fn run<S, R>(&self, host_id: Uuid, sink: S, source: R) -> TerminalResult<TerminalSession>
    where
        S: FrameSink + 'static,
        R: FrameSource + 'static,
    {
        let sink: Arc<dyn FrameSink> = Arc::new(sink);

        let host = match self.hosts.get_host(host_id).await {
            Ok(host) => host,
            Err(e) => return Err(report(&sink, "Host not found", e.into()).await),
        };

        let span = info_span!(span_names::TERMINAL_SESSION, host = %host.name);
        self.run_for_host(host, sink, source).instrument(span).await
    }

    async fn run_for_host<R>(
        &self,
        host: Host,
        sink: Arc<dyn FrameSink>,
        source: R,
    ) -> TerminalResult<TerminalSession>
    where
        R: FrameSource + 'static,
    {
        let credentials = match resolve_credentials(&host, self.vault.as_ref()).await {
            Ok(credentials) => credentials,
            Err(e) => {
                return Err(report(&sink, "Failed to decrypt credentials", e.into()).await);
            }
        };

        let target = DialTarget::new(host.key(), host.username.clone(), credentials);
        let conn = match self.pool.acquire(&target).await {
            Ok(conn) => conn,
            Err(e) => {
                let message = format!("SSH connection failed: {e}");
                return Err(report(&sink, &message, e.into()).await);
            }
        };

        let session = match conn.open_session().await {
            Ok(session) => session,
            Err(e) => return Err(report(&sink, "Failed to create SSH session", e.into()).await),
        };

        let streams = match self.start_shell(session.as_ref()).await {
            Ok(streams) => streams,
            Err((message, e)) => {
                session.close().await;
                return Err(report(&sink, message, e.into()).await);
            }
        };

        let started_at = Utc::now();
        let clock = Instant::now();
        info!(host = %host.host, "Terminal session started");

        let counters = Arc::new(Counters::default());
        let buffer_size = self.config.read_buffer_size.max(1);

        let mut stdout_task = tokio::spawn(forward_output(
            streams.stdout,
            Arc::clone(&sink),
            Arc::clone(&counters),
            buffer_size,
        ));
        let stderr_task = tokio::spawn(forward_output(
            streams.stderr,
            Arc::clone(&sink),
            Arc::clone(&counters),
            buffer_size,
        ));
        let mut input_task = tokio::spawn(forward_input(
            source,
            streams.stdin,
            Arc::clone(&session),
            Arc::clone(&counters),
        ));

        let remote_ended = tokio::select! {
            _ = &mut stdout_task => true,
            _ = &mut input_task => false,
        };
        debug!(remote_ended, "Terminal session ending");

        session.close().await;
        cancel(stderr_task).await;
        if remote_ended {
            cancel(input_task).await;
        } else {
            cancel(stdout_task).await;
        }
        let _ = sink.send(Frame::Close).await;

        let ended_at = Utc::now();
        let record = TerminalSession {
            id: Uuid::new_v4(),
            host_id: host.id,
            started_at,
            ended_at,
            duration_seconds: clock.elapsed().as_secs(),
            commands_executed: counters.commands.load(Ordering::SeqCst),
            bytes_transferred: counters.bytes.load(Ordering::SeqCst),
        };

        if let Err(e) = self.sessions.insert_session(record.clone()).await {
            warn!(error = %e, "Failed to store terminal session");
        }
        if let Err(e) = self.hosts.set_last_connected(host.id, ended_at).await {
            warn!(error = %e, "Failed to update last connected time");
        }

        info!(
            duration = record.duration_seconds,
            commands = record.commands_executed,
            bytes = record.bytes_transferred,
            "Terminal session ended"
        );
        Ok(record)
    }

    async fn start_shell(
        &self,
        session: &dyn RemoteSession,
    ) -> Result<ShellStreams, (&'static str, SessionError)> {
        session
            .request_pty(self.config.pty.clone())
            .await
            .map_err(|e| ("Failed to request PTY", e))?;
        session
            .start_shell()
            .await
            .map_err(|e| ("Failed to start shell", e))
    }
}

async fn cancel(task: JoinHandle<()>) {
    task.abort();
    let _ = task.await;
}

/// Writes a diagnostic to the channel and hands the error back
async fn report(sink: &Arc<dyn FrameSink>, message: &str, error: TerminalError) -> TerminalError {
    warn!(error = %error, "{message}");
    let _ = sink.send(Frame::Text(format!("Error: {message}"))).await;
    error
}

/// Copies one remote output stream to the channel
async fn forward_output(
    mut reader: ShellReader,
    sink: Arc<dyn FrameSink>,
    counters: Arc<Counters>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                counters.bytes.fetch_add(n as u64, Ordering::SeqCst);
                if sink.send(Frame::Binary(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Remote read failed");
                break;
            }
        }
    }
}

/// Copies client frames to remote stdin, diverting control messages
async fn forward_input<R: FrameSource>(
    mut source: R,
    mut stdin: ShellWriter,
    session: Arc<dyn RemoteSession>,
    counters: Arc<Counters>,
) {
    while let Some(frame) = source.recv().await {
        let bytes = match frame {
            Frame::Close => break,
            Frame::Text(text) => {
                if let Some(ControlMessage::Resize { cols, rows }) = ControlMessage::parse(&text) {
                    if let Err(e) = session.window_change(cols, rows).await {
                        debug!(error = %e, cols, rows, "Window change failed");
                    }
                    continue;
                }
                if text.ends_with('\r') {
                    counters.commands.fetch_add(1, Ordering::SeqCst);
                }
                text.into_bytes()
            }
            Frame::Binary(bytes) => bytes,
        };

        counters.bytes.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        if let Err(e) = stdin.write_all(&bytes).await {
            debug!(error = %e, "Remote stdin closed");
            break;
        }
        if let Err(e) = stdin.flush().await {
            debug!(error = %e, "Remote stdin flush failed");
            break;
        }
    }
    let _ = stdin.shutdown().await;
}
