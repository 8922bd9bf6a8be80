//! Transport over the system OpenSSH client
//!
//! Each pooled connection is one `ssh -M -N` ControlMaster process with its
//! own control socket. Logical sessions are `ssh -S <socket>` children that
//! multiplex over the master, so opening a session costs no handshake.
//! Password authentication goes through `sshpass -e` (the secret travels in
//! the `SSHPASS` environment variable, never on the command line).
//!
//! The dialer does not bound a dial by itself: the pool and the connectivity
//! tester wrap it in their own deadline and drop the future when it expires.
//! Everything a dial leaves on disk is held by a [`ScratchFile`], so a
//! dropped dial cleans up after itself.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{CommandBuilder, MasterPty, PtySize, native_pty_system};
use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use uuid::Uuid;

use super::{
    Credentials, DialTarget, ExecOutput, PtyRequest, RemoteSession, ShellStreams, SshDialer,
    SshTransport,
};
use crate::error::{ConnectError, ConnectResult, SessionError, SessionResult};

/// Default `ConnectTimeout` passed to `ssh` (seconds)
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// How often the dialer polls the control socket while the master starts
const READY_POLL: Duration = Duration::from_millis(100);

/// Buffer between the local PTY threads and the async side
const PTY_PIPE_CAPACITY: usize = 16 * 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Maps `ssh` diagnostics to the connectivity taxonomy
#[must_use]
pub fn classify_ssh_failure(target: &str, stderr: &str) -> ConnectError {
    let lower = stderr.to_lowercase();
    let detail = stderr.trim();
    let detail = if detail.is_empty() { target } else { detail };

    if lower.contains("permission denied") || lower.contains("authentication failed") {
        ConnectError::AuthFailed(target.to_string())
    } else if lower.contains("timed out") {
        ConnectError::Timeout(target.to_string())
    } else if lower.contains("could not resolve")
        || lower.contains("no route to host")
        || lower.contains("connection refused")
        || lower.contains("network is unreachable")
        || lower.contains("name or service not known")
    {
        ConnectError::Unreachable(detail.to_string())
    } else if lower.contains("invalid format") || lower.contains("bad permissions") {
        ConnectError::InvalidCredentials(detail.to_string())
    } else {
        ConnectError::Transport(detail.to_string())
    }
}

/// Dials connections by spawning OpenSSH ControlMaster processes
#[derive(Debug, Clone)]
pub struct OpenSshDialer {
    ssh_program: String,
    control_dir: PathBuf,
    connect_timeout: Duration,
    strict_host_key_checking: String,
}

impl Default for OpenSshDialer {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenSshDialer {
    /// Creates a dialer with sockets under the system temp directory
    #[must_use]
    pub fn new() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            control_dir: std::env::temp_dir().join(format!("fleetdeck-{}", std::process::id())),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            strict_host_key_checking: "accept-new".to_string(),
        }
    }

    /// Sets the TCP connect timeout handed to `ssh` (whole seconds, at least one)
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the `ssh` binary
    #[must_use]
    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Sets the directory holding control sockets and key files
    #[must_use]
    pub fn with_control_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.control_dir = dir.into();
        self
    }

    /// Sets the `StrictHostKeyChecking` option (`yes`, `accept-new`, `no`)
    #[must_use]
    pub fn with_host_key_checking(mut self, value: impl Into<String>) -> Self {
        self.strict_host_key_checking = value.into();
        self
    }

    fn prepare_control_dir(&self) -> ConnectResult<()> {
        std::fs::create_dir_all(&self.control_dir).map_err(|e| {
            ConnectError::Transport(format!(
                "Cannot create control directory {}: {e}",
                self.control_dir.display()
            ))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(
                &self.control_dir,
                std::fs::Permissions::from_mode(0o700),
            );
        }
        Ok(())
    }

    fn master_command(
        &self,
        target: &DialTarget,
        socket: &Path,
        key_file: Option<&Path>,
    ) -> Command {
        let mut cmd = match &target.credentials {
            Credentials::Password(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg(&self.ssh_program);
                cmd.env("SSHPASS", password.expose_secret());
                cmd
            }
            _ => {
                let mut cmd = Command::new(&self.ssh_program);
                cmd.arg("-o").arg("BatchMode=yes");
                cmd
            }
        };

        cmd.arg("-M")
            .arg("-N")
            .arg("-S")
            .arg(socket)
            .arg("-o")
            .arg("ControlPersist=no")
            .arg("-o")
            .arg(format!(
                "StrictHostKeyChecking={}",
                self.strict_host_key_checking
            ))
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg("-p")
            .arg(target.key.port.to_string());

        match (&target.credentials, key_file) {
            (_, Some(path)) => {
                cmd.arg("-o").arg("IdentitiesOnly=yes").arg("-i").arg(path);
            }
            (Credentials::IdentityFile(path), None) => {
                cmd.arg("-i").arg(path);
            }
            (Credentials::Password(_), None) => {
                cmd.arg("-o")
                    .arg("PreferredAuthentications=password,keyboard-interactive")
                    .arg("-o")
                    .arg("PubkeyAuthentication=no");
            }
            _ => {}
        }

        cmd.arg(format!("{}@{}", target.username, target.key.host));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn wait_until_ready(
        &self,
        child: &mut Child,
        socket: &Path,
        target: &DialTarget,
    ) -> ConnectResult<()> {
        let label = target.key.to_string();
        loop {
            if let Ok(Some(_status)) = child.try_wait() {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                return Err(classify_ssh_failure(&label, &stderr));
            }

            if socket.exists() && control_check(&self.ssh_program, socket).await {
                return Ok(());
            }

            tokio::time::sleep(READY_POLL).await;
        }
    }
}

async fn control_check(ssh_program: &str, socket: &Path) -> bool {
    Command::new(ssh_program)
        .arg("-S")
        .arg(socket)
        .arg("-O")
        .arg("check")
        .arg("fleetdeck")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

/// Forwards the master's diagnostics to the log until the pipe closes
///
/// Nobody else reads the pipe once the master is up; a full pipe would
/// block `ssh` on its next write.
fn drain_stderr<R>(pipe: R, destination: String)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(destination = %destination, "ssh: {line}");
        }
    });
}

/// A file created for one connection, removed when the guard drops
#[derive(Debug)]
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn write_key_file(path: &Path, key: &str) -> ConnectResult<ScratchFile> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .map_err(|e| ConnectError::InvalidCredentials(format!("Cannot write key file: {e}")))?;
    let guard = ScratchFile(path.to_path_buf());
    let mut body = key.trim_end().to_string();
    body.push('\n');
    file.write_all(body.as_bytes())
        .map_err(|e| ConnectError::InvalidCredentials(format!("Cannot write key file: {e}")))?;
    Ok(guard)
}

#[async_trait]
impl SshDialer for OpenSshDialer {
    async fn dial(&self, target: &DialTarget) -> ConnectResult<Arc<dyn SshTransport>> {
        self.prepare_control_dir()?;

        let id = Uuid::new_v4().simple().to_string();
        let socket = ScratchFile(self.control_dir.join(format!("{}.sock", &id[..12])));

        let key_file = match &target.credentials {
            Credentials::PrivateKey(key) => {
                let path = self.control_dir.join(format!("{}.key", &id[..12]));
                Some(write_key_file(&path, key.expose_secret())?)
            }
            _ => None,
        };

        let mut child = self
            .master_command(target, socket.path(), key_file.as_ref().map(ScratchFile::path))
            .spawn()
            .map_err(|e| {
                ConnectError::Transport(format!("Failed to spawn {}: {e}", self.ssh_program))
            })?;

        if let Err(e) = self.wait_until_ready(&mut child, socket.path(), target).await {
            let _ = child.kill().await;
            return Err(e);
        }

        let destination = format!("{}@{}", target.username, target.key.host);
        if let Some(stderr) = child.stderr.take() {
            drain_stderr(stderr, destination.clone());
        }

        Ok(Arc::new(OpenSshTransport {
            ssh_program: self.ssh_program.clone(),
            socket: socket.path().to_path_buf(),
            destination,
            port: target.key.port,
            master: tokio::sync::Mutex::new(Some(child)),
            scratch: Mutex::new(vec![Some(socket), key_file].into_iter().flatten().collect()),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One ControlMaster process and its socket
struct OpenSshTransport {
    ssh_program: String,
    socket: PathBuf,
    destination: String,
    port: u16,
    master: tokio::sync::Mutex<Option<Child>>,
    /// Control socket and key file; dropping the transport removes them too
    scratch: Mutex<Vec<ScratchFile>>,
    closed: AtomicBool,
}

#[async_trait]
impl SshTransport for OpenSshTransport {
    async fn probe(&self) -> ConnectResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectError::Transport("Connection closed".to_string()));
        }
        if control_check(&self.ssh_program, &self.socket).await {
            Ok(())
        } else {
            Err(ConnectError::Transport(format!(
                "Control master for {} is not answering",
                self.destination
            )))
        }
    }

    async fn open_session(&self) -> SessionResult<Arc<dyn RemoteSession>> {
        if self.closed.load(Ordering::Acquire) || !self.socket.exists() {
            return Err(SessionError::Closed);
        }
        Ok(Arc::new(OpenSshSession {
            ssh_program: self.ssh_program.clone(),
            socket: self.socket.clone(),
            destination: self.destination.clone(),
            port: self.port,
            pty: Mutex::new(None),
            shell: Mutex::new(None),
        }))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = Command::new(&self.ssh_program)
            .arg("-S")
            .arg(&self.socket)
            .arg("-O")
            .arg("exit")
            .arg("fleetdeck")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Some(mut child) = self.master.lock().await.take() {
            let _ = child.kill().await;
        }
        lock(&self.scratch).clear();
    }
}

/// Local PTY hosting an interactive `ssh -tt` client
struct PtyShell {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
}

/// A session multiplexed over a control socket
struct OpenSshSession {
    ssh_program: String,
    socket: PathBuf,
    destination: String,
    port: u16,
    pty: Mutex<Option<PtyRequest>>,
    shell: Mutex<Option<PtyShell>>,
}

impl OpenSshSession {
    fn base_args(&self) -> Vec<String> {
        vec![
            "-S".to_string(),
            self.socket.display().to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ]
    }

    fn start_piped_shell(&self) -> SessionResult<ShellStreams> {
        let mut child = Command::new(&self.ssh_program)
            .args(self.base_args())
            .arg("-T")
            .arg(&self.destination)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Shell(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Shell("stdin pipe unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Shell("stdout pipe unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::Shell("stderr pipe unavailable".to_string()))?;

        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(ShellStreams {
            stdin: Box::pin(stdin),
            stdout: Box::pin(stdout),
            stderr: Box::pin(stderr),
        })
    }

    fn start_pty_shell(&self, request: &PtyRequest) -> SessionResult<ShellStreams> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: request.rows,
                cols: request.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&self.ssh_program);
        cmd.args(self.base_args());
        cmd.arg("-tt");
        cmd.arg(&self.destination);
        cmd.env("TERM", &request.term);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::Shell(e.to_string()))?;
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::Pty(e.to_string()))?;
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::Pty(e.to_string()))?;

        let handle = tokio::runtime::Handle::current();
        let (stdout_local, mut stdout_remote) = tokio::io::duplex(PTY_PIPE_CAPACITY);
        let (stdin_local, mut stdin_remote) = tokio::io::duplex(PTY_PIPE_CAPACITY);

        let out_handle = handle.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if out_handle
                            .block_on(stdout_remote.write_all(&buf[..n]))
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
            let _ = out_handle.block_on(stdout_remote.shutdown());
        });

        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match handle.block_on(stdin_remote.read(&mut buf)) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if writer.write_all(&buf[..n]).is_err() || writer.flush().is_err() {
                            break;
                        }
                    }
                }
            }
        });

        *lock(&self.shell) = Some(PtyShell {
            master: pair.master,
            child,
        });

        Ok(ShellStreams {
            stdin: Box::pin(stdin_local),
            stdout: Box::pin(stdout_local),
            stderr: Box::pin(tokio::io::empty()),
        })
    }
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn exec(&self, command: &str) -> SessionResult<ExecOutput> {
        let output = Command::new(&self.ssh_program)
            .args(self.base_args())
            .arg("-T")
            .arg(&self.destination)
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .output()
            .await
            .map_err(|e| SessionError::Exec(e.to_string()))?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    async fn request_pty(&self, request: PtyRequest) -> SessionResult<()> {
        if request.cols == 0 || request.rows == 0 {
            return Err(SessionError::Pty(format!(
                "Invalid geometry {}x{}",
                request.cols, request.rows
            )));
        }
        *lock(&self.pty) = Some(request);
        Ok(())
    }

    async fn start_shell(&self) -> SessionResult<ShellStreams> {
        let request = lock(&self.pty).clone();
        match request {
            Some(request) => self.start_pty_shell(&request),
            None => self.start_piped_shell(),
        }
    }

    async fn window_change(&self, cols: u16, rows: u16) -> SessionResult<()> {
        let guard = lock(&self.shell);
        let shell = guard
            .as_ref()
            .ok_or_else(|| SessionError::Pty("No PTY attached".to_string()))?;
        shell
            .master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::Pty(e.to_string()))
    }

    async fn close(&self) {
        if let Some(mut shell) = lock(&self.shell).take() {
            let _ = shell.child.kill();
        }
    }
}
