//! One-shot command execution
//!
//! A command runs in its own logical session on a pooled connection. When
//! the caller's timeout fires the caller stops waiting; the remote command
//! is left to finish and its session is closed once it does.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::error::{ExecError, ExecResult, SessionError};
use crate::models::{CommandRecord, Host};
use crate::pool::ConnectionPool;
use crate::safety::classify;
use crate::secret::{CredentialVault, resolve_credentials};
use crate::store::{CommandLog, HostDirectory};
use crate::tracing::span_names;
use crate::transport::DialTarget;

/// Exit code recorded when the remote side reports none
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Runs single commands on hosts and logs the results
#[derive(Clone)]
pub struct CommandRunner {
    pool: ConnectionPool,
    hosts: Arc<dyn HostDirectory>,
    log: Arc<dyn CommandLog>,
    vault: Arc<dyn CredentialVault>,
}

impl std::fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRunner").finish_non_exhaustive()
    }
}

impl CommandRunner {
    /// Creates a runner
    #[must_use]
    pub fn new(
        pool: ConnectionPool,
        hosts: Arc<dyn HostDirectory>,
        log: Arc<dyn CommandLog>,
        vault: Arc<dyn CredentialVault>,
    ) -> Self {
        Self {
            pool,
            hosts,
            log,
            vault,
        }
    }

    /// Runs `command` on `host_id`, waiting at most `timeout`
    ///
    /// # Errors
    ///
    /// Fails when the host is unknown, credentials cannot be resolved, the
    /// connection or session cannot be set up, or the timeout elapses. A
    /// non-zero exit status is not an error.
    pub async fn run(
        &self,
        host_id: Uuid,
        command: &str,
        timeout: Duration,
    ) -> ExecResult<CommandRecord> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        let host = self.hosts.get_host(host_id).await?;
        let span = info_span!(span_names::COMMAND_EXEC, host = %host.name);
        self.run_on(&host, command, timeout).instrument(span).await
    }

    async fn run_on(
        &self,
        host: &Host,
        command: &str,
        timeout: Duration,
    ) -> ExecResult<CommandRecord> {
        let credentials = resolve_credentials(host, self.vault.as_ref()).await?;
        let target = DialTarget::new(host.key(), host.username.clone(), credentials);
        let conn = self.pool.acquire(&target).await?;
        let session = conn.open_session().await?;

        let executed_at = Utc::now();
        let start = Instant::now();

        let owned_command = command.to_string();
        let task = tokio::spawn(async move {
            let result = session.exec(&owned_command).await;
            session.close().await;
            result
        });

        let output = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                return Err(SessionError::Exec(join_error.to_string()).into());
            }
            Err(_) => {
                debug!(command, "Stopped waiting for command");
                return Err(ExecError::Timeout(timeout.as_secs()));
            }
        };

        let record = CommandRecord {
            id: Uuid::new_v4(),
            host_id: host.id,
            command: command.to_string(),
            output: output.combined(),
            exit_code: output.exit_code.unwrap_or(UNKNOWN_EXIT_CODE),
            executed_at,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        if let Err(e) = self.log.insert_command(record.clone()).await {
            warn!(error = %e, "Failed to store command record");
        }
        debug!(exit_code = record.exit_code, duration_ms = record.duration_ms, "Command finished");
        Ok(record)
    }

    /// Runs `command` only when it classifies as safe
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Refused`] without touching the pool when the
    /// command is not safe; otherwise as [`run`](Self::run).
    pub async fn run_if_safe(
        &self,
        host_id: Uuid,
        command: &str,
        timeout: Duration,
    ) -> ExecResult<CommandRecord> {
        let verdict = classify(command);
        if !verdict.is_safe {
            debug!(base = %verdict.base_command, category = %verdict.category, "Refusing command");
            return Err(ExecError::Refused(Box::new(verdict)));
        }
        self.run(host_id, command, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectError, StoreError};
    use crate::pool::PoolConfig;
    use crate::safety::SafetyCategory;
    use crate::secret::PlaintextVault;
    use crate::store::MemoryStore;
    use crate::transport::ExecOutput;
    use crate::transport::mock::MockDialer;

    fn setup() -> (MockDialer, Arc<MemoryStore>, CommandRunner, Host) {
        let host = Host::new("web", "web.local", "ops").with_encrypted_password("pw");
        let dialer = MockDialer::new();
        let store = Arc::new(MemoryStore::with_inventory(vec![host.clone()], Vec::new()));
        let pool = ConnectionPool::new(Arc::new(dialer.clone()), PoolConfig::default());
        let runner = CommandRunner::new(pool, store.clone(), store.clone(), Arc::new(PlaintextVault));
        (dialer, store, runner, host)
    }

    #[tokio::test]
    async fn test_run_records_combined_output() {
        let (dialer, store, runner, host) = setup();
        dialer.script(
            "uname -a",
            ExecOutput {
                stdout: "Linux web".into(),
                stderr: "warning".into(),
                exit_code: Some(3),
            },
        );

        let record = runner.run(host.id, "uname -a", Duration::from_secs(5)).await.unwrap();

        assert_eq!(record.output, "Linux web\nwarning");
        assert_eq!(record.exit_code, 3);
        assert_eq!(store.commands().await, vec![record]);
        let session = dialer.last_transport().unwrap().last_session().unwrap();
        assert_eq!(session.executed(), vec!["uname -a".to_string()]);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_missing_exit_status_is_minus_one() {
        let (dialer, _, runner, host) = setup();
        dialer.script("reboot-check", ExecOutput::default());

        let record = runner
            .run(host.id, "reboot-check", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(record.exit_code, UNKNOWN_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_errors_before_execution() {
        let (dialer, store, runner, host) = setup();

        assert!(matches!(
            runner.run(host.id, "   ", Duration::from_secs(1)).await,
            Err(ExecError::EmptyCommand)
        ));
        assert!(matches!(
            runner.run(Uuid::new_v4(), "ls", Duration::from_secs(1)).await,
            Err(ExecError::Store(StoreError::NotFound { .. }))
        ));

        dialer.set_dial_error(Some(ConnectError::Unreachable("web.local:22".into())));
        assert!(matches!(
            runner.run(host.id, "ls", Duration::from_secs(1)).await,
            Err(ExecError::Connect(ConnectError::Unreachable(_)))
        ));
        assert!(store.commands().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_command_running() {
        let (dialer, store, runner, host) = setup();
        dialer.set_exec_delay(Duration::from_secs(30));

        let err = runner
            .run(host.id, "sleep 30", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout(2)));
        assert!(store.commands().await.is_empty());

        let session = dialer.last_transport().unwrap().last_session().unwrap();
        assert!(!session.is_closed());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_unsafe_command_never_reaches_pool() {
        let (dialer, _, runner, host) = setup();

        let err = runner
            .run_if_safe(host.id, "rm -rf /", Duration::from_secs(1))
            .await
            .unwrap_err();

        let ExecError::Refused(verdict) = err else {
            panic!("expected refusal");
        };
        assert_eq!(verdict.category, SafetyCategory::Dangerous);
        assert_eq!(dialer.dial_count(), 0);

        assert!(runner.run_if_safe(host.id, "uptime", Duration::from_secs(1)).await.is_ok());
        assert_eq!(dialer.dial_count(), 1);
    }
}
