//! Connectivity testing
//!
//! A test dials a fresh connection outside the pool, runs `echo ok` and
//! tears everything down again, so it exercises credentials and the
//! transport end to end without leaving anything resident.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::ConnectError;
use crate::models::{Host, HostStatus};
use crate::secret::{CredentialVault, resolve_credentials};
use crate::store::HostDirectory;
use crate::transport::{DialTarget, SshDialer, SshTransport};

/// Default timeout for one connectivity test
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 10;

/// Default number of concurrent tests in a batch
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Command run to prove the shell works
pub const TEST_COMMAND: &str = "echo ok";

/// Result of testing one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Tested host
    pub host_id: Uuid,
    /// Host display name
    pub host_name: String,
    /// Whether the test passed
    pub success: bool,
    /// Round trip of dial plus command, when successful
    pub latency_ms: Option<u64>,
    /// Failure description
    pub error: Option<String>,
}

impl TestResult {
    /// Passed test
    #[must_use]
    pub fn success(host: &Host, latency_ms: u64) -> Self {
        Self {
            host_id: host.id,
            host_name: host.name.clone(),
            success: true,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    /// Failed test
    #[must_use]
    pub fn failure(host: &Host, error: impl Into<String>) -> Self {
        Self {
            host_id: host.id,
            host_name: host.name.clone(),
            success: false,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}

/// Results of a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSummary {
    /// Hosts tested
    pub total: usize,
    /// Tests passed
    pub passed: usize,
    /// Tests failed
    pub failed: usize,
    /// Individual results
    pub results: Vec<TestResult>,
}

impl TestSummary {
    /// Builds a summary from individual results
    #[must_use]
    pub fn from_results(results: Vec<TestResult>) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            total,
            passed,
            failed: total - passed,
            results,
        }
    }

    /// True when nothing failed
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Pass rate in percent; 100 for an empty batch
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.passed as f64 / self.total as f64 * 100.0
    }

    /// One-line summary
    #[must_use]
    pub fn summary_string(&self) -> String {
        format!(
            "Total: {}, Passed: {}, Failed: {} ({:.1}% pass rate)",
            self.total,
            self.passed,
            self.failed,
            self.pass_rate()
        )
    }
}

/// Tests hosts with throwaway connections
#[derive(Clone)]
pub struct ConnectionTester {
    dialer: Arc<dyn SshDialer>,
    hosts: Arc<dyn HostDirectory>,
    vault: Arc<dyn CredentialVault>,
    timeout: Duration,
    concurrency: usize,
}

impl std::fmt::Debug for ConnectionTester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTester")
            .field("timeout", &self.timeout)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl ConnectionTester {
    /// Creates a tester with default timeout and concurrency
    #[must_use]
    pub fn new(
        dialer: Arc<dyn SshDialer>,
        hosts: Arc<dyn HostDirectory>,
        vault: Arc<dyn CredentialVault>,
    ) -> Self {
        Self {
            dialer,
            hosts,
            vault,
            timeout: Duration::from_secs(DEFAULT_TEST_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets the per-host timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the batch concurrency
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Tests one host and records its reachability
    pub async fn test_host(&self, host: &Host) -> TestResult {
        let credentials = match resolve_credentials(host, self.vault.as_ref()).await {
            Ok(credentials) => credentials,
            Err(e) => return TestResult::failure(host, format!("Failed to decrypt credentials: {e}")),
        };
        let target = DialTarget::new(host.key(), host.username.clone(), credentials);

        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.dial_and_echo(&target)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ConnectError::Timeout(target.key.to_string()).to_string()),
        };

        let (result, status) = match outcome {
            Ok(()) => {
                let latency = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                (TestResult::success(host, latency), HostStatus::Online)
            }
            Err(message) => (TestResult::failure(host, message), HostStatus::Offline),
        };

        if let Err(e) = self.hosts.set_status(host.id, status).await {
            debug!(host = %host.name, error = %e, "Failed to update host status");
        }
        debug!(host = %host.name, success = result.success, "Connectivity test finished");
        result
    }

    async fn dial_and_echo(&self, target: &DialTarget) -> Result<(), String> {
        let transport = self.dialer.dial(target).await.map_err(|e| e.to_string())?;
        let outcome = echo(transport.as_ref()).await;
        transport.close().await;
        outcome
    }

    /// Tests several hosts, at most `concurrency` at a time
    pub async fn test_batch(&self, hosts: &[Host]) -> TestSummary {
        use futures::stream::{self, StreamExt};

        let results: Vec<TestResult> = stream::iter(hosts)
            .map(|host| self.test_host(host))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        TestSummary::from_results(results)
    }
}

async fn echo(transport: &dyn SshTransport) -> Result<(), String> {
    let session = transport.open_session().await.map_err(|e| e.to_string())?;
    let result = session.exec(TEST_COMMAND).await;
    session.close().await;

    let output = result.map_err(|e| e.to_string())?;
    if output.success() && output.stdout.trim() == "ok" {
        Ok(())
    } else {
        Err(format!(
            "unexpected response to `{TEST_COMMAND}` (exit {:?}): {}",
            output.exit_code,
            output.combined().trim()
        ))
    }
}
