//! Periodic metrics collection
//!
//! Every tick launches one task per host. A host's probes run one after
//! another over short-lived sessions on a pooled connection; hosts never
//! wait on each other. A host whose previous collection is still running is
//! skipped for that tick.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::probes::Probe;
use super::sample::MetricSample;
use crate::error::{ConnectError, CredentialError};
use crate::models::{Host, HostStatus};
use crate::pool::{ConnectionPool, RemoteConnection};
use crate::secret::{CredentialVault, resolve_credentials};
use crate::store::{HostDirectory, MetricsSink};
use crate::tracing::span_names;
use crate::transport::DialTarget;

/// Minimum accepted collection interval
pub const MIN_COLLECT_INTERVAL_SECS: u64 = 5;

/// Collector timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Timeout for one probe session
    pub probe_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

impl CollectorConfig {
    /// Interval clamped to [`MIN_COLLECT_INTERVAL_SECS`]
    #[must_use]
    pub fn effective_interval(&self) -> Duration {
        self.interval
            .max(Duration::from_secs(MIN_COLLECT_INTERVAL_SECS))
    }
}

/// Result of collecting one host
#[derive(Debug, Clone)]
pub enum CollectionOutcome {
    /// A sample was written
    Collected(Box<MetricSample>),
    /// The connection could not be acquired; host marked offline
    Offline(ConnectError),
    /// Credentials could not be resolved; nothing was attempted
    CredentialFailed(CredentialError),
}

struct CollectorInner {
    pool: ConnectionPool,
    hosts: Arc<dyn HostDirectory>,
    sink: Arc<dyn MetricsSink>,
    vault: Arc<dyn CredentialVault>,
    config: CollectorConfig,
    in_flight: StdMutex<HashSet<Uuid>>,
    tasks: Mutex<JoinSet<()>>,
    stop_tx: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// Samples host health through the shared pool
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<CollectorInner>,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Removes a host from the in-flight set when its task ends
struct InFlightGuard {
    inner: Arc<CollectorInner>,
    host_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.host_id);
    }
}

impl MetricsCollector {
    /// Creates a stopped collector
    #[must_use]
    pub fn new(
        pool: ConnectionPool,
        hosts: Arc<dyn HostDirectory>,
        sink: Arc<dyn MetricsSink>,
        vault: Arc<dyn CredentialVault>,
        config: CollectorConfig,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(CollectorInner {
                pool,
                hosts,
                sink,
                vault,
                config,
                in_flight: StdMutex::new(HashSet::new()),
                tasks: Mutex::new(JoinSet::new()),
                stop_tx,
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Starts the loop: one pass immediately, then one per interval
    ///
    /// Calling `start` on a running collector does nothing.
    pub async fn start(&self) {
        let mut ticker_slot = self.inner.ticker.lock().await;
        if ticker_slot.is_some() || *self.inner.stop_tx.borrow() {
            return;
        }

        let interval = self.inner.config.effective_interval();
        let mut stop = self.inner.stop_tx.subscribe();
        let collector = self.clone();

        *ticker_slot = Some(tokio::spawn(async move {
            collector.collect_now().await;

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        collector.collect_now().await;
                    }
                }
            }
        }));

        info!(interval_secs = interval.as_secs(), "Metrics collector started");
    }

    /// Stops the loop and waits for in-flight collections to finish
    pub async fn stop(&self) {
        let _ = self.inner.stop_tx.send(true);

        if let Some(handle) = self.inner.ticker.lock().await.take() {
            let _ = handle.await;
        }

        let mut tasks = self.inner.tasks.lock().await;
        while tasks.join_next().await.is_some() {}

        info!("Metrics collector stopped");
    }

    /// Launches a collection task for every host not already being collected
    ///
    /// Returns the number of tasks launched. The tasks run in the background.
    pub async fn collect_now(&self) -> usize {
        let hosts = match self.inner.hosts.list_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!(error = %e, "Cannot list hosts for metrics collection");
                return 0;
            }
        };

        let mut tasks = self.inner.tasks.lock().await;
        while tasks.try_join_next().is_some() {}

        let mut launched = 0;
        for host in hosts {
            let newly_added = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(host.id);
            if !newly_added {
                debug!(host = %host.name, "Previous collection still running, skipping");
                continue;
            }

            let guard = InFlightGuard {
                inner: Arc::clone(&self.inner),
                host_id: host.id,
            };
            let collector = self.clone();
            tasks.spawn(async move {
                let _guard = guard;
                collector.collect_host(&host).await;
            });
            launched += 1;
        }
        launched
    }

    /// Collects every host concurrently and waits for all of them
    pub async fn collect_all(&self) -> Vec<(Host, CollectionOutcome)> {
        let hosts = match self.inner.hosts.list_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!(error = %e, "Cannot list hosts for metrics collection");
                return Vec::new();
            }
        };

        let mut set = JoinSet::new();
        for host in hosts {
            let collector = self.clone();
            set.spawn(async move {
                let outcome = collector.collect_host(&host).await;
                (host, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(result) = joined {
                results.push(result);
            }
        }
        results
    }

    /// Collects one host and persists the sample
    pub async fn collect_host(&self, host: &Host) -> CollectionOutcome {
        let span = info_span!(span_names::METRICS_COLLECT, host = %host.name);
        self.collect_host_inner(host).instrument(span).await
    }

    async fn collect_host_inner(&self, host: &Host) -> CollectionOutcome {
        let credentials = match resolve_credentials(host, self.inner.vault.as_ref()).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(error = %e, "Cannot resolve credentials, skipping host");
                return CollectionOutcome::CredentialFailed(e);
            }
        };

        let target = DialTarget::new(host.key(), host.username.clone(), credentials);
        let conn = match self.inner.pool.acquire(&target).await {
            Ok(conn) => conn,
            Err(e) => {
                debug!(error = %e, "Metrics collection failed");
                self.set_status(host, HostStatus::Offline).await;
                return CollectionOutcome::Offline(e);
            }
        };
        self.set_status(host, HostStatus::Online).await;

        let mut sample = MetricSample::empty(host.id);
        sample.collected_at = Utc::now();
        for probe in Probe::ALL {
            let output = self.run_probe(&conn, probe).await;
            probe.apply(&output, &mut sample);
        }

        if let Err(e) = self.inner.sink.insert_sample(sample.clone()).await {
            warn!(error = %e, "Failed to store metric sample");
        }
        debug!(
            cpu = sample.cpu_percent,
            mem_used = sample.memory_used_mb,
            "Metrics collected"
        );
        CollectionOutcome::Collected(Box::new(sample))
    }

    /// Runs one probe in its own session; any failure yields empty output
    async fn run_probe(&self, conn: &RemoteConnection, probe: Probe) -> String {
        let run = async {
            let session = conn.open_session().await.ok()?;
            let result = session.exec(probe.command()).await;
            session.close().await;
            result.ok()
        };

        match tokio::time::timeout(self.inner.config.probe_timeout, run).await {
            Ok(Some(output)) if output.success() => output.stdout,
            Ok(Some(output)) => {
                debug!(?probe, exit_code = ?output.exit_code, "Probe exited unsuccessfully");
                String::new()
            }
            Ok(None) => {
                debug!(?probe, "Probe session failed");
                String::new()
            }
            Err(_) => {
                debug!(?probe, "Probe timed out");
                String::new()
            }
        }
    }

    async fn set_status(&self, host: &Host, status: HostStatus) {
        if let Err(e) = self.inner.hosts.set_status(host.id, status).await {
            debug!(error = %e, %status, "Failed to update host status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::secret::PlaintextVault;
    use crate::store::MemoryStore;
    use crate::transport::mock::MockDialer;

    fn setup(hosts: Vec<Host>) -> (MockDialer, Arc<MemoryStore>, MetricsCollector) {
        let dialer = MockDialer::new();
        let store = Arc::new(MemoryStore::with_inventory(hosts, Vec::new()));
        let pool = ConnectionPool::new(Arc::new(dialer.clone()), PoolConfig::default());
        let collector = MetricsCollector::new(
            pool,
            store.clone(),
            store.clone(),
            Arc::new(PlaintextVault),
            CollectorConfig::default(),
        );
        (dialer, store, collector)
    }

    fn host(name: &str) -> Host {
        Host::new(name, format!("{name}.local"), "ops").with_encrypted_password("pw")
    }

    #[tokio::test]
    async fn test_collect_host_writes_sample_and_marks_online() {
        let web = host("web");
        let (dialer, store, collector) = setup(vec![web.clone()]);
        dialer.script_stdout(crate::monitoring::probes::MEMORY_COMMAND, "Mem: 2048 1024 0 0 0 0\n");
        dialer.script_stdout(crate::monitoring::probes::UPTIME_COMMAND, "120.5 10.0\n");

        let outcome = collector.collect_host(&web).await;

        let CollectionOutcome::Collected(sample) = outcome else {
            panic!("expected a sample");
        };
        assert!((sample.memory_total_mb - 2048.0).abs() < f64::EPSILON);
        assert_eq!(sample.uptime_seconds, 120);
        assert_eq!(store.samples_for(web.id).await.len(), 1);
        assert_eq!(store.get_host(web.id).await.unwrap().status, HostStatus::Online);

        let transport = dialer.last_transport().unwrap();
        assert_eq!(transport.sessions().len(), Probe::ALL.len());
        assert!(transport.sessions().iter().all(|s| s.is_closed()));
    }

    #[tokio::test]
    async fn test_failed_probe_yields_zero_field_but_sample_is_written() {
        let web = host("web");
        let (dialer, store, collector) = setup(vec![web.clone()]);
        dialer.script(
            crate::monitoring::probes::DISK_COMMAND,
            crate::transport::ExecOutput {
                stdout: "/dev/sda1 100 50 50 50% /".into(),
                stderr: "df: warning".into(),
                exit_code: Some(1),
            },
        );

        collector.collect_host(&web).await;

        let samples = store.samples_for(web.id).await;
        assert_eq!(samples.len(), 1);
        assert!(samples[0].disk_total_gb.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_unreachable_host_goes_offline_without_sample() {
        let web = host("web");
        let (dialer, store, collector) = setup(vec![web.clone()]);
        dialer.set_dial_error(Some(ConnectError::Unreachable("web.local:22".into())));

        let outcome = collector.collect_host(&web).await;

        assert!(matches!(outcome, CollectionOutcome::Offline(_)));
        assert!(store.samples_for(web.id).await.is_empty());
        assert_eq!(store.get_host(web.id).await.unwrap().status, HostStatus::Offline);
    }

    #[tokio::test]
    async fn test_missing_credentials_skip_without_dialing() {
        let bare = Host::new("bare", "bare.local", "ops");
        let (dialer, store, collector) = setup(vec![bare.clone()]);

        let outcome = collector.collect_host(&bare).await;

        assert!(matches!(outcome, CollectionOutcome::CredentialFailed(_)));
        assert_eq!(dialer.dial_count(), 0);
        assert_eq!(store.get_host(bare.id).await.unwrap().status, HostStatus::Unknown);
    }

    #[tokio::test]
    async fn test_collect_all_covers_every_host() {
        let (_, store, collector) = setup(vec![host("a"), host("b"), host("c")]);
        let results = collector.collect_all().await;
        assert_eq!(results.len(), 3);
        assert_eq!(store.all_samples().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_collects_on_start_and_each_tick() {
        let web = host("web");
        let (_, store, collector) = setup(vec![web.clone()]);

        collector.start().await;
        tokio::time::sleep(Duration::from_secs(125)).await;
        collector.stop().await;

        // initial pass plus ticks at 60s and 120s
        assert_eq!(store.samples_for(web.id).await.len(), 3);
    }

    #[test]
    fn test_interval_is_clamped() {
        let config = CollectorConfig {
            interval: Duration::from_secs(1),
            ..CollectorConfig::default()
        };
        assert_eq!(config.effective_interval(), Duration::from_secs(5));
    }
}
