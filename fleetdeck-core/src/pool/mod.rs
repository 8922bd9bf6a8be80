//! Connection pool
//!
//! Keeps a small set of authenticated connections per `host:port` and hands
//! the same connection to every concurrent caller. Connections are probed
//! before reuse, pinged by a keepalive task, and closed by a periodic idle
//! sweep.
//!
//! The registry mutex is never held across network I/O: candidates are
//! snapshotted under the lock and probed outside it, dials run outside it,
//! and closes happen after the lock is released. Dials for the same key are
//! serialized by a per-key dial lock so a burst of callers for a cold key
//! produces a single dial; other keys are unaffected.
//!
//! Eviction is lazy. A keepalive task that sees its probe fail stops pinging
//! and leaves removal to the next acquire or the idle sweep.

mod connection;
mod key;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, warn};

pub use connection::RemoteConnection;
pub use key::ConnectionKey;

use crate::error::{ConnectError, ConnectResult};
use crate::tracing::span_names;
use crate::transport::{DialTarget, SshDialer};

/// Default advisory cap on connections per key
pub const DEFAULT_MAX_CONNS_PER_SERVER: usize = 5;

/// Pool timing and capacity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Advisory cap per key; inserting beyond it closes the least recently
    /// used connection instead of refusing the dial
    pub max_conns_per_server: usize,
    /// Connections unused for this long are closed by the sweep
    pub idle_timeout: Duration,
    /// Period of the per-connection keepalive
    pub keepalive_interval: Duration,
    /// Period of the idle sweep
    pub sweep_interval: Duration,
    /// Timeout for one dial
    pub dial_timeout: Duration,
    /// Timeout for one health probe
    pub probe_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_conns_per_server: DEFAULT_MAX_CONNS_PER_SERVER,
            idle_timeout: Duration::from_secs(600),
            keepalive_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            dial_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Point-in-time view of the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Keys with at least one connection
    pub keys: usize,
    /// Live connections across all keys
    pub connections: usize,
}

type Registry = HashMap<ConnectionKey, Vec<Arc<RemoteConnection>>>;

struct PoolInner {
    config: PoolConfig,
    dialer: Arc<dyn SshDialer>,
    registry: Mutex<Registry>,
    dial_locks: Mutex<HashMap<ConnectionKey, Arc<Mutex<()>>>>,
    tasks: Mutex<JoinSet<()>>,
    stop_tx: watch::Sender<bool>,
    started: AtomicBool,
    shut_down: AtomicBool,
}

/// Shared registry of connections keyed by `host:port`
///
/// Cloning is cheap and yields a handle to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Creates an empty pool; call [`ConnectionPool::start`] to run the sweep
    #[must_use]
    pub fn new(dialer: Arc<dyn SshDialer>, config: PoolConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(PoolInner {
                config,
                dialer,
                registry: Mutex::new(HashMap::new()),
                dial_locks: Mutex::new(HashMap::new()),
                tasks: Mutex::new(JoinSet::new()),
                stop_tx,
                started: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Whether [`ConnectionPool::shutdown`] has been called
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Starts the background idle sweep; later calls are no-ops
    pub async fn start(&self) {
        if self.is_shut_down() || self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval;

        self.spawn_supervised(move |mut stop| async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let closed = Self { inner }.sweep_idle().await;
                        if closed > 0 {
                            debug!(closed, "Idle sweep closed connections");
                        }
                    }
                }
            }
        })
        .await;
    }

    /// Returns a healthy connection for `target`, dialing one if needed
    ///
    /// # Errors
    ///
    /// Returns the dial failure (never retried here), or
    /// [`ConnectError::PoolClosed`] after shutdown.
    pub async fn acquire(&self, target: &DialTarget) -> ConnectResult<Arc<RemoteConnection>> {
        let span = info_span!(span_names::POOL_ACQUIRE, key = %target.key);
        self.acquire_inner(target).instrument(span).await
    }

    async fn acquire_inner(&self, target: &DialTarget) -> ConnectResult<Arc<RemoteConnection>> {
        if self.is_shut_down() {
            return Err(ConnectError::PoolClosed);
        }

        if let Some(conn) = self.find_healthy(&target.key).await {
            return Ok(conn);
        }

        let dial_lock = self.dial_lock(&target.key).await;
        let _dialing = dial_lock.lock().await;

        // Someone else may have dialed while we waited
        if let Some(conn) = self.find_healthy(&target.key).await {
            return Ok(conn);
        }

        let conn = Arc::new(self.dial(target).await?);
        self.insert(Arc::clone(&conn)).await?;
        self.spawn_keepalive(&conn).await;
        Ok(conn)
    }

    /// Probes the key's connections in order; failed ones are evicted
    async fn find_healthy(&self, key: &ConnectionKey) -> Option<Arc<RemoteConnection>> {
        let candidates = {
            let registry = self.inner.registry.lock().await;
            registry.get(key).cloned().unwrap_or_default()
        };

        for conn in candidates {
            match tokio::time::timeout(self.inner.config.probe_timeout, conn.probe()).await {
                Ok(Ok(())) => {
                    conn.touch();
                    debug!(connection_id = %conn.id(), "Reusing pooled connection");
                    return Some(conn);
                }
                Ok(Err(e)) => {
                    debug!(connection_id = %conn.id(), error = %e, "Health probe failed, evicting");
                    self.evict(&conn).await;
                }
                Err(_) => {
                    debug!(connection_id = %conn.id(), "Health probe timed out, evicting");
                    self.evict(&conn).await;
                }
            }
        }
        None
    }

    async fn dial_lock(&self, key: &ConnectionKey) -> Arc<Mutex<()>> {
        let mut locks = self.inner.dial_locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    async fn dial(&self, target: &DialTarget) -> ConnectResult<RemoteConnection> {
        let span = info_span!(span_names::POOL_DIAL, key = %target.key);
        async {
            let started = Instant::now();
            let dialed =
                tokio::time::timeout(self.inner.config.dial_timeout, self.inner.dialer.dial(target))
                    .await;

            let transport = match dialed {
                Ok(Ok(transport)) => transport,
                Ok(Err(e)) => {
                    warn!(error = %e, "Dial failed");
                    return Err(e);
                }
                Err(_) => {
                    warn!("Dial timed out");
                    return Err(ConnectError::Timeout(target.key.to_string()));
                }
            };

            let conn = RemoteConnection::new(target.key.clone(), transport);
            info!(
                connection_id = %conn.id(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Connected"
            );
            Ok(conn)
        }
        .instrument(span)
        .await
    }

    async fn insert(&self, conn: Arc<RemoteConnection>) -> ConnectResult<()> {
        let displaced = {
            let mut registry = self.inner.registry.lock().await;
            if self.is_shut_down() {
                None
            } else {
                let slot = registry.entry(conn.key().clone()).or_default();
                slot.push(Arc::clone(&conn));
                let mut displaced = Vec::new();
                while slot.len() > self.inner.config.max_conns_per_server.max(1) {
                    let Some(lru) = slot
                        .iter()
                        .enumerate()
                        .filter(|(_, c)| c.id() != conn.id())
                        .min_by_key(|(_, c)| c.last_used())
                        .map(|(idx, _)| idx)
                    else {
                        break;
                    };
                    displaced.push(slot.remove(lru));
                }
                Some(displaced)
            }
        };

        match displaced {
            None => {
                conn.close().await;
                Err(ConnectError::PoolClosed)
            }
            Some(displaced) => {
                for old in displaced {
                    debug!(connection_id = %old.id(), "Cap reached, closing least recently used");
                    old.close().await;
                }
                Ok(())
            }
        }
    }

    /// Removes one connection from the registry and closes it
    async fn evict(&self, conn: &Arc<RemoteConnection>) {
        {
            let mut registry = self.inner.registry.lock().await;
            if let Some(slot) = registry.get_mut(conn.key()) {
                slot.retain(|c| c.id() != conn.id());
                if slot.is_empty() {
                    registry.remove(conn.key());
                }
            }
        }
        conn.close().await;
    }

    async fn spawn_keepalive(&self, conn: &Arc<RemoteConnection>) {
        let weak: Weak<RemoteConnection> = Arc::downgrade(conn);
        let period = self.inner.config.keepalive_interval;
        let probe_timeout = self.inner.config.probe_timeout;

        self.spawn_supervised(move |mut stop| async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        let Some(conn) = weak.upgrade() else { break };
                        if conn.is_closed() {
                            break;
                        }
                        let alive = matches!(
                            tokio::time::timeout(probe_timeout, conn.probe()).await,
                            Ok(Ok(()))
                        );
                        if !alive {
                            debug!(connection_id = %conn.id(), key = %conn.key(), "Keepalive failed, stopping");
                            break;
                        }
                    }
                }
            }
        })
        .await;
    }

    /// Spawns a task that receives the stop signal, unless already shut down
    async fn spawn_supervised<F, Fut>(&self, task: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.inner.tasks.lock().await;
        if self.is_shut_down() {
            return;
        }
        while tasks.try_join_next().is_some() {}
        let stop = self.inner.stop_tx.subscribe();
        tasks.spawn(task(stop));
    }

    /// Closes every connection unused for longer than the idle timeout
    ///
    /// Returns the number of connections closed.
    pub async fn sweep_idle(&self) -> usize {
        let idle_timeout = self.inner.config.idle_timeout;
        let expired: Vec<Arc<RemoteConnection>> = {
            let mut registry = self.inner.registry.lock().await;
            let mut expired = Vec::new();
            registry.retain(|_, slot| {
                let (stale, fresh): (Vec<_>, Vec<_>) =
                    slot.drain(..).partition(|c| c.idle_for() >= idle_timeout);
                expired.extend(stale);
                *slot = fresh;
                !slot.is_empty()
            });
            expired
        };

        let mut closed = 0;
        for conn in expired {
            debug!(connection_id = %conn.id(), key = %conn.key(), "Closing idle connection");
            if conn.close().await {
                closed += 1;
            }
        }
        closed
    }

    /// Closes every connection and stops background tasks
    ///
    /// Waits for an in-flight sweep or keepalive tick to finish first.
    /// Calling it more than once is harmless.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.inner.stop_tx.send(true);

        {
            let mut tasks = self.inner.tasks.lock().await;
            while tasks.join_next().await.is_some() {}
        }

        let drained: Vec<Arc<RemoteConnection>> = {
            let mut registry = self.inner.registry.lock().await;
            registry.drain().flat_map(|(_, slot)| slot).collect()
        };
        let count = drained.len();
        for conn in drained {
            conn.close().await;
        }
        self.inner.dial_locks.lock().await.clear();

        info!(closed = count, "Connection pool shut down");
    }

    /// Registry counts
    pub async fn stats(&self) -> PoolStats {
        let registry = self.inner.registry.lock().await;
        PoolStats {
            keys: registry.len(),
            connections: registry.values().map(Vec::len).sum(),
        }
    }

    /// Number of live connections for `key`
    pub async fn connection_count(&self, key: &ConnectionKey) -> usize {
        self.inner
            .registry
            .lock()
            .await
            .get(key)
            .map_or(0, Vec::len)
    }
}
